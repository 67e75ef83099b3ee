// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Högbom CLEAN.

use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{DeconvolutionStage, StageError};
use crate::{
    constants::{DEFAULT_CLEAN_FRACTIONAL_THRESHOLD, DEFAULT_CLEAN_GAIN, DEFAULT_CLEAN_NITER},
    image::Image,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanParams {
    /// The maximum number of components per image plane.
    pub niter: usize,
    /// The loop gain.
    pub gain: f64,
    /// Stop once the residual peak is below this.
    pub threshold: f64,
    /// Stop once the residual peak is below this fraction of its starting
    /// value.
    pub fractional_threshold: f64,
}

impl Default for CleanParams {
    fn default() -> Self {
        CleanParams {
            niter: DEFAULT_CLEAN_NITER,
            gain: DEFAULT_CLEAN_GAIN,
            threshold: 0.0,
            fractional_threshold: DEFAULT_CLEAN_FRACTIONAL_THRESHOLD,
        }
    }
}

/// A single CLEAN component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanComponent {
    pub chan: usize,
    pub pol: usize,
    pub y: usize,
    pub x: usize,
    pub flux: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HogbomClean {
    pub params: CleanParams,
}

impl HogbomClean {
    pub fn new(params: CleanParams) -> HogbomClean {
        HogbomClean { params }
    }

    /// CLEAN every (channel, polarisation) plane of `residual`. Returns the
    /// image of the components found and the components themselves.
    ///
    /// The PSF can't be smaller than the residual. Where a shifted PSF doesn't
    /// reach part of the residual, nothing is subtracted there, so a PSF
    /// twice the size of the residual (see [`Image::psf_template`]) is needed
    /// for an exact subtraction everywhere.
    pub fn clean(
        &self,
        residual: &Image,
        psf: &Image,
    ) -> Result<(Image, Vec<CleanComponent>), StageError> {
        if psf.ny() < residual.ny() || psf.nx() < residual.nx() {
            return Err(StageError::Deconvolution(format!(
                "PSF is {}x{} pixels, smaller than the {}x{} residual",
                psf.ny(),
                psf.nx(),
                residual.ny(),
                residual.nx()
            )));
        }
        if !(self.params.gain > 0.0 && self.params.gain <= 1.0) {
            return Err(StageError::Deconvolution(format!(
                "the loop gain must be in (0, 1], not {}",
                self.params.gain
            )));
        }

        let planes = (0..residual.num_chans())
            .flat_map(|c| (0..residual.num_pols()).map(move |p| (c, p)))
            .collect::<Vec<_>>();
        let cleaned: Vec<(usize, usize, Array2<f64>, Vec<CleanComponent>)> = planes
            .into_par_iter()
            .map(|(c, p)| {
                // Use the closest PSF plane available.
                let psf_plane = psf.data.slice(s![
                    c.min(psf.num_chans().saturating_sub(1)),
                    p.min(psf.num_pols().saturating_sub(1)),
                    ..,
                    ..
                ]);
                let (model, components) = self.clean_plane(
                    residual.data.slice(s![c, p, .., ..]).to_owned(),
                    psf_plane,
                    c,
                    p,
                );
                (c, p, model, components)
            })
            .collect();

        let mut model = residual.zeros_like();
        let mut all_components = vec![];
        for (c, p, plane, components) in cleaned {
            model.data.slice_mut(s![c, p, .., ..]).assign(&plane);
            all_components.extend(components);
        }
        debug!("Högbom CLEAN found {} components", all_components.len());
        Ok((model, all_components))
    }

    fn clean_plane(
        &self,
        mut residual: Array2<f64>,
        psf: ArrayView2<f64>,
        chan: usize,
        pol: usize,
    ) -> (Array2<f64>, Vec<CleanComponent>) {
        let mut model = Array2::zeros(residual.raw_dim());
        let mut components = vec![];
        let Some(((psf_y, psf_x), psf_peak)) = argmax_abs(psf.view()) else {
            return (model, components);
        };
        if psf_peak == 0.0 {
            return (model, components);
        }
        let (psf_ny, psf_nx) = psf.dim();

        let Some((_, initial_peak)) = argmax_abs(residual.view()) else {
            return (model, components);
        };
        let stop = self
            .params
            .threshold
            .max(self.params.fractional_threshold * initial_peak.abs());

        for _ in 0..self.params.niter {
            let Some(((y, x), peak)) = argmax_abs(residual.view()) else {
                break;
            };
            if peak.abs() <= stop || peak == 0.0 {
                break;
            }
            let flux = self.params.gain * peak / psf_peak;
            model[(y, x)] += flux;
            components.push(CleanComponent {
                chan,
                pol,
                y,
                x,
                flux,
            });

            // Subtract the shifted PSF.
            let dy = y as isize - psf_y as isize;
            let dx = x as isize - psf_x as isize;
            for ((ry, rx), r) in residual.indexed_iter_mut() {
                let py = ry as isize - dy;
                let px = rx as isize - dx;
                if py >= 0 && px >= 0 && (py as usize) < psf_ny && (px as usize) < psf_nx {
                    *r -= flux * psf[(py as usize, px as usize)];
                }
            }
        }
        (model, components)
    }
}

/// The index and value of the largest-magnitude element.
fn argmax_abs(a: ArrayView2<f64>) -> Option<((usize, usize), f64)> {
    a.indexed_iter()
        .filter(|(_, v)| v.is_finite())
        .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
        .map(|(i, &v)| (i, v))
}

impl DeconvolutionStage for HogbomClean {
    fn deconvolve(
        &self,
        residual: &Image,
        psf: &Image,
        model: &Image,
    ) -> Result<Image, StageError> {
        let (components, _) = self.clean(residual, psf)?;
        Ok(model.add(&components)?)
    }
}
