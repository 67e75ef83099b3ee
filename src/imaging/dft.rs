// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Imaging with a direct Fourier transform.
//!
//! Every pixel is treated as a point source, so this is exact (no gridding
//! errors) but slow. It's intended for small images and for testing.

use log::trace;
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    restore::{convolve_with_gaussian, estimate_beam_sigma},
    ImagingStage, Inverted, StageError,
};
use crate::{
    c64,
    coord::{LmnRime, UVW},
    image::{jones_to_brightness, Image, SkyGrid},
    vis::Visibility,
    Jones,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DftImagingParams {
    /// The standard deviation of the restoring beam \[pixels\]. If not given,
    /// it's estimated from the PSF.
    pub restoring_beam_sigma: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DftImager {
    pub params: DftImagingParams,
}

impl DftImager {
    pub fn new(params: DftImagingParams) -> DftImager {
        DftImager { params }
    }
}

/// The image channel with the frequency closest to `freq`.
fn image_channel(grid: &SkyGrid, freq: f64) -> usize {
    grid.frequencies
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - freq).abs().total_cmp(&(*b - freq).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A pixel with emission.
struct ModelPixel {
    lmn: LmnRime,
    brightness: Jones,
}

impl ImagingStage for DftImager {
    fn predict(&self, vis: &mut Visibility, model: &Image) -> Result<(), StageError> {
        let pixels: Vec<Vec<ModelPixel>> = (0..model.num_chans())
            .map(|i_chan| {
                let mut pixels = vec![];
                for y in 0..model.ny() {
                    for x in 0..model.nx() {
                        let brightness = model.pixel_jones(i_chan, y, x);
                        if brightness.norm_sqr() > 0.0 {
                            pixels.push(ModelPixel {
                                lmn: model.grid.pixel_to_lmn(x, y).prepare_for_rime(),
                                brightness,
                            });
                        }
                    }
                }
                pixels
            })
            .collect();
        trace!(
            "Predicting {} model pixels into {} visibilities",
            pixels.iter().map(|p| p.len()).sum::<usize>(),
            vis.len()
        );

        vis.rows.par_iter_mut().for_each(|row| {
            let pixels = &pixels[image_channel(&model.grid, row.frequency)];
            // Divide UVW by lambda to make UVW dimensionless.
            let UVW { u, v, w } = row.uvw.in_wavelengths(row.frequency);
            let mut jones_accum = Jones::zero();
            for &ModelPixel {
                lmn: LmnRime { l, m, n },
                brightness,
            } in pixels.iter()
            {
                jones_accum += brightness * c64::cis(u * l + v * m + w * n);
            }
            row.vis += jones_accum;
        });
        Ok(())
    }

    fn invert(
        &self,
        vis: &Visibility,
        template: &Image,
        dopsf: bool,
    ) -> Result<Inverted, StageError> {
        let grid = &template.grid;
        let num_chans = template.num_chans();
        let num_pols = template.num_pols();

        // (uvw in wavelengths, weight, data) per image channel.
        let mut chan_rows: Vec<Vec<(UVW, f64, Jones)>> = vec![vec![]; num_chans];
        for row in vis.rows.iter().filter(|r| !r.is_flagged()) {
            let data = if dopsf { Jones::identity() } else { row.vis };
            chan_rows[image_channel(grid, row.frequency)].push((
                row.uvw.in_wavelengths(row.frequency),
                row.weight,
                data,
            ));
        }

        let mut image = template.zeros_like();
        let mut sumwt = Array2::zeros((num_chans, num_pols));
        for ((mut chan, mut chan_sumwt), rows) in image
            .data
            .outer_iter_mut()
            .zip(sumwt.outer_iter_mut())
            .zip(chan_rows.iter())
        {
            let total_weight: f64 = rows.iter().map(|(_, w, _)| w).sum();
            chan_sumwt.fill(total_weight);
            if total_weight <= 0.0 {
                continue;
            }

            // Parallelise over rows of pixels. Axes are (pol, y, x).
            chan.axis_iter_mut(Axis(1))
                .into_par_iter()
                .enumerate()
                .for_each(|(y, mut pols_x)| {
                    for (x, pols) in pols_x.axis_iter_mut(Axis(1)).enumerate() {
                        let LmnRime { l, m, n } = grid.pixel_to_lmn(x, y).prepare_for_rime();
                        let mut jones_accum = Jones::zero();
                        for &(UVW { u, v, w }, weight, data) in rows {
                            // Conjugate of the phase used in prediction.
                            jones_accum += data * (c64::cis(-(u * l + v * m + w * n)) * weight);
                        }
                        jones_to_brightness(jones_accum * (1.0 / total_weight), pols);
                    }
                });
        }

        Ok(Inverted { image, sumwt })
    }

    fn restore(&self, model: &Image, psf: &Image, residual: &Image) -> Result<Image, StageError> {
        let sigma = match self.params.restoring_beam_sigma {
            Some(s) => s,
            None => estimate_beam_sigma(psf)?,
        };
        let mut restored = convolve_with_gaussian(model, sigma);
        restored = restored.add(residual)?;
        Ok(restored)
    }
}
