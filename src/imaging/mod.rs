// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Imaging and deconvolution.

The pipelines only talk to imaging and deconvolution through the
[`ImagingStage`] and [`DeconvolutionStage`] traits. A direct-Fourier-transform
imager ([`DftImager`]) and a Högbom CLEAN ([`HogbomClean`]) are provided as
reference implementations.
 */

mod clean;
mod dft;
mod error;
mod restore;
#[cfg(test)]
mod tests;

pub use clean::{CleanComponent, CleanParams, HogbomClean};
pub use dft::{DftImager, DftImagingParams};
pub use error::StageError;
pub use restore::{convolve_with_gaussian, estimate_beam_sigma};

use ndarray::prelude::*;

use crate::{image::Image, vis::Visibility};

/// The result of inverting visibilities into an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Inverted {
    /// A dirty (or residual) image, or a PSF.
    pub image: Image,
    /// The sum of the weights that went into each (channel, polarisation)
    /// plane.
    pub sumwt: Array2<f64>,
}

/// Fourier imaging.
pub trait ImagingStage: Send + Sync {
    /// Add the visibilities of `model` to `vis`. Callers wanting only the
    /// model should zero `vis` first.
    fn predict(&self, vis: &mut Visibility, model: &Image) -> Result<(), StageError>;

    /// Image `vis` onto the grid of `template`. With `dopsf`, the point spread
    /// function is made instead.
    fn invert(&self, vis: &Visibility, template: &Image, dopsf: bool)
        -> Result<Inverted, StageError>;

    /// Convolve `model` with a clean beam matched to `psf`, and add
    /// `residual`.
    fn restore(&self, model: &Image, psf: &Image, residual: &Image) -> Result<Image, StageError>;
}

/// Turn a residual image into model updates.
pub trait DeconvolutionStage: Send + Sync {
    /// Deconvolve `residual` with `psf`, returning `model` plus whatever was
    /// found.
    fn deconvolve(&self, residual: &Image, psf: &Image, model: &Image)
        -> Result<Image, StageError>;
}

/// Combine inverted images from several visibility sets into one, weighting
/// each plane by its sum of weights.
pub fn sum_invert_results(results: &[Inverted]) -> Result<Inverted, StageError> {
    let (first, rest) = results.split_first().ok_or(StageError::NothingToCombine)?;
    if rest.is_empty() {
        return Ok(first.clone());
    }

    let mut image = first.image.zeros_like();
    let mut sumwt = Array2::zeros(first.sumwt.raw_dim());
    for result in results {
        if !result.image.same_grid(&first.image) {
            return Err(crate::image::ImageError::GridMismatch.into());
        }
        for ((mut chan, result_chan), (wts, mut total)) in image
            .data
            .outer_iter_mut()
            .zip(result.image.data.outer_iter())
            .zip(result.sumwt.outer_iter().zip(sumwt.outer_iter_mut()))
        {
            for (((mut pol, result_pol), &wt), total) in chan
                .outer_iter_mut()
                .zip(result_chan.outer_iter())
                .zip(wts.iter())
                .zip(total.iter_mut())
            {
                pol.scaled_add(wt, &result_pol);
                *total += wt;
            }
        }
    }
    for (mut chan, wts) in image.data.outer_iter_mut().zip(sumwt.outer_iter()) {
        for (mut pol, &wt) in chan.outer_iter_mut().zip(wts.iter()) {
            if wt > 0.0 {
                pol /= wt;
            }
        }
    }
    Ok(Inverted { image, sumwt })
}
