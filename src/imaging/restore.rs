// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Restoring beams.

use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;

use super::StageError;
use crate::{constants::FWHM_FACTOR, image::Image};

/// Estimate the standard deviation of the PSF's main lobe \[pixels\] from its
/// half-power width along x and y.
pub fn estimate_beam_sigma(psf: &Image) -> Result<f64, StageError> {
    if psf.num_chans() == 0 || psf.nx() == 0 || psf.ny() == 0 {
        return Err(StageError::Imaging("the PSF is empty".to_string()));
    }
    let plane = psf.data.slice(s![0, 0, .., ..]);
    let (peak_y, peak_x) = plane
        .indexed_iter()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or_default();
    let peak = plane[(peak_y, peak_x)];
    if peak.is_nan() || peak <= 0.0 {
        return Err(StageError::Imaging(
            "the PSF has no positive peak".to_string(),
        ));
    }

    let hwhm_x = half_width(plane.row(peak_y), peak_x, peak);
    let hwhm_y = half_width(plane.column(peak_x), peak_y, peak);
    // Never narrower than a pixel's worth.
    let sigma = (0.5 * (hwhm_x + hwhm_y) * 2.0 / FWHM_FACTOR).max(0.5);
    debug!("Restoring beam sigma estimated from the PSF: {sigma:.3} pixels");
    Ok(sigma)
}

/// The distance from `peak_index` to where `profile` first drops below half
/// of `peak`, linearly interpolated and averaged over both directions.
fn half_width(profile: ArrayView1<f64>, peak_index: usize, peak: f64) -> f64 {
    let half = peak / 2.0;
    let walk = |step: isize| -> f64 {
        let mut prev = peak;
        let mut i = peak_index as isize;
        loop {
            i += step;
            if i < 0 || i >= profile.len() as isize {
                // Never dropped to half power; use the distance to the edge.
                return (i - peak_index as isize).unsigned_abs() as f64 - 1.0;
            }
            let v = profile[i as usize];
            if v < half {
                let dist = (i - peak_index as isize).unsigned_abs() as f64;
                return dist - 1.0 + (prev - half) / (prev - v);
            }
            prev = v;
        }
    };
    0.5 * (walk(1) + walk(-1))
}

/// A 1D Gaussian kernel with unit peak.
fn make_gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (sigma * 3.0).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    (0..2 * radius + 1)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / s2).exp()
        })
        .collect()
}

fn convolve_1d(line: ArrayView1<f64>, kernel: &[f64], mut out: ArrayViewMut1<f64>) {
    let radius = (kernel.len() / 2) as isize;
    let len = line.len() as isize;
    for (i, o) in out.iter_mut().enumerate() {
        *o = kernel
            .iter()
            .enumerate()
            .filter_map(|(k, &kv)| {
                let src = i as isize + k as isize - radius;
                (0..len).contains(&src).then(|| line[src as usize] * kv)
            })
            .sum();
    }
}

/// Convolve every plane of `image` with a unit-peak circular Gaussian of
/// standard deviation `sigma` pixels, using separable 1D passes. Pixels
/// beyond the image edge are zero.
pub fn convolve_with_gaussian(image: &Image, sigma: f64) -> Image {
    let kernel = make_gaussian_kernel(sigma);
    let mut out = image.zeros_like();
    let (nchan, npol, ny, nx) = image.data.dim();
    let mut planes = Vec::with_capacity(nchan * npol);
    for c in 0..nchan {
        for p in 0..npol {
            planes.push(image.data.slice(s![c, p, .., ..]));
        }
    }
    let convolved: Vec<Array2<f64>> = planes
        .into_par_iter()
        .map(|plane| {
            let mut rows = Array2::<f64>::zeros((ny, nx));
            for (line, out) in plane.outer_iter().zip(rows.outer_iter_mut()) {
                convolve_1d(line, &kernel, out);
            }
            let mut both = Array2::<f64>::zeros((ny, nx));
            for (line, out) in rows.columns().into_iter().zip(both.columns_mut()) {
                convolve_1d(line, &kernel, out);
            }
            both
        })
        .collect();
    for (i, convolved) in convolved.into_iter().enumerate() {
        out.data
            .slice_mut(s![i / npol, i % npol, .., ..])
            .assign(&convolved);
    }
    out
}
