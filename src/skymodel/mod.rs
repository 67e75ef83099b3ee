// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky models: an image, discrete components, an optional mask and an optional
gain table, predicted into (or inverted from) visibilities.

Each visibility set is paired with the sky model at the same position in its
list, and every pair is processed independently and in parallel.
 */

mod error;
#[cfg(test)]
mod tests;

pub use error::SkymodelError;

use log::{debug, warn};
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{
    c64,
    calibration::{apply_gaintable, GainTable},
    coord::{LMN, UVW},
    image::{brightness_to_jones, Image},
    imaging::{ImagingStage, Inverted},
    vis::Visibility,
    ConfigurationError, Jones,
};

/// A point source.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyComponent {
    /// Direction cosines relative to the phase centre \[radians\]
    pub l: f64,
    pub m: f64,
    /// Axes are (channel, polarisation); polarisations as for images.
    pub flux: Array2<f64>,
    /// \[Hz\]
    pub frequencies: Vec<f64>,
}

impl SkyComponent {
    /// An unpolarised (Stokes I) component with the same flux density at all
    /// `frequencies`.
    pub fn unpolarised(l: f64, m: f64, flux: f64, frequencies: Vec<f64>) -> SkyComponent {
        SkyComponent {
            l,
            m,
            flux: Array2::from_elem((frequencies.len(), 1), flux),
            frequencies,
        }
    }

    fn nearest_channel(&self, freq: f64) -> usize {
        nearest(&self.frequencies, freq)
    }
}

fn nearest(freqs: &[f64], freq: f64) -> usize {
    freqs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - freq).abs().total_cmp(&(*b - freq).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[derive(Clone, Debug, Default)]
pub struct SkyModel {
    pub image: Option<Image>,
    pub components: Vec<SkyComponent>,
    /// Multiplies both the image and the components.
    pub mask: Option<Image>,
    pub gaintable: Option<GainTable>,
}

impl SkyModel {
    /// Check that the mask is on the same grid as the image. `index` is this
    /// model's position in its list.
    pub fn validate(&self, index: usize) -> Result<(), ConfigurationError> {
        if let (Some(image), Some(mask)) = (&self.image, &self.mask) {
            if image.grid != mask.grid
                || image.ny() != mask.ny()
                || image.nx() != mask.nx()
                || image.num_chans() != mask.num_chans()
                || (mask.num_pols() != 1 && mask.num_pols() != image.num_pols())
            {
                return Err(ConfigurationError::MaskGridMismatch(index));
            }
        }
        Ok(())
    }

    /// Is there anything to predict?
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && !self.image.as_ref().map(|i| i.is_nontrivial()).unwrap_or(false)
    }
}

/// Scale each component's flux by the value of `beam` at the component's
/// position (nearest pixel). Components off the image get no flux.
pub fn apply_beam_to_components(
    components: &[SkyComponent],
    beam: &Image,
) -> Vec<SkyComponent> {
    components
        .iter()
        .map(|comp| {
            let mut comp = comp.clone();
            let (x, y) = beam.grid.lm_to_pixel(comp.l, comp.m);
            let (x, y) = (x.round(), y.round());
            let on_image =
                x >= 0.0 && y >= 0.0 && (x as usize) < beam.nx() && (y as usize) < beam.ny();
            if !on_image {
                debug!(
                    "Component at (l, m) = ({}, {}) is outside the beam image",
                    comp.l, comp.m
                );
                comp.flux.fill(0.0);
                return comp;
            }
            let (x, y) = (x as usize, y as usize);
            for (i_chan, mut pols) in comp.flux.outer_iter_mut().enumerate() {
                let beam_chan = nearest(&beam.grid.frequencies, comp.frequencies[i_chan]);
                for (i_pol, flux) in pols.iter_mut().enumerate() {
                    let beam_pol = if beam.num_pols() == 1 { 0 } else { i_pol };
                    *flux *= beam.data[(beam_chan, beam_pol, y, x)];
                }
            }
            comp
        })
        .collect()
}

/// Add the visibilities of `components` to `vis`.
pub fn predict_skycomponent_visibility(vis: &mut Visibility, components: &[SkyComponent]) {
    let lmns = components
        .iter()
        .map(|c| LMN::from_lm(c.l, c.m).prepare_for_rime())
        .collect::<Vec<_>>();
    vis.rows.par_iter_mut().for_each(|row| {
        let UVW { u, v, w } = row.uvw.in_wavelengths(row.frequency);
        let mut jones_accum = Jones::zero();
        for (comp, lmn) in components.iter().zip(lmns.iter()) {
            let i_chan = comp.nearest_channel(row.frequency);
            let brightness = brightness_to_jones(comp.flux.row(i_chan));
            jones_accum += brightness * c64::cis(u * lmn.l + v * lmn.m + w * lmn.n);
        }
        row.vis += jones_accum;
    });
}

fn check_lengths(num_vis: usize, skymodels: &[SkyModel]) -> Result<(), ConfigurationError> {
    if num_vis != skymodels.len() {
        return Err(ConfigurationError::ListLengthMismatch {
            what: "sky models",
            expected: num_vis,
            got: skymodels.len(),
        });
    }
    for (i, sm) in skymodels.iter().enumerate() {
        sm.validate(i)?;
    }
    Ok(())
}

/// Predict each sky model into a zeroed copy of its visibilities. Components
/// and the image are both multiplied by the mask, if there is one. With
/// `docal`, the sky model's gain table is applied to the prediction.
pub fn predict_skymodel(
    vis_list: &[Visibility],
    skymodels: &[SkyModel],
    imaging: &dyn ImagingStage,
    docal: bool,
) -> Result<Vec<Visibility>, SkymodelError> {
    check_lengths(vis_list.len(), skymodels)?;
    vis_list
        .par_iter()
        .zip(skymodels.par_iter())
        .enumerate()
        .map(|(i, (vis, skymodel))| predict_one(i, vis, skymodel, imaging, docal))
        .collect()
}

fn predict_one(
    index: usize,
    vis: &Visibility,
    skymodel: &SkyModel,
    imaging: &dyn ImagingStage,
    docal: bool,
) -> Result<Visibility, SkymodelError> {
    let mut predicted = vis.zeroed_copy();
    if skymodel.is_empty() {
        warn!("Sky model {index} has no components and no image emission; its prediction is zero");
    }

    if !skymodel.components.is_empty() {
        match &skymodel.mask {
            Some(mask) => {
                let masked = apply_beam_to_components(&skymodel.components, mask);
                predict_skycomponent_visibility(&mut predicted, &masked);
            }
            None => predict_skycomponent_visibility(&mut predicted, &skymodel.components),
        }
    }

    if let Some(image) = skymodel.image.as_ref().filter(|i| i.is_nontrivial()) {
        match &skymodel.mask {
            Some(mask) => imaging.predict(&mut predicted, &image.multiply_by(mask)?)?,
            None => imaging.predict(&mut predicted, image)?,
        }
    }

    if let (true, Some(gt)) = (docal, &skymodel.gaintable) {
        let block = apply_gaintable(predicted.to_block()?, gt, false)?;
        predicted = block.to_flat();
    }
    Ok(predicted)
}

/// Invert each visibility set onto the grid of its sky model's image. With
/// `docal`, the sky model's gain table is removed first. The result is
/// multiplied by the mask, if there is one.
pub fn invert_skymodel(
    vis_list: &[Visibility],
    skymodels: &[SkyModel],
    imaging: &dyn ImagingStage,
    docal: bool,
) -> Result<Vec<Inverted>, SkymodelError> {
    check_lengths(vis_list.len(), skymodels)?;
    for (i, sm) in skymodels.iter().enumerate() {
        if sm.image.is_none() {
            return Err(ConfigurationError::MissingImage(i).into());
        }
    }
    vis_list
        .par_iter()
        .zip(skymodels.par_iter())
        .enumerate()
        .map(|(i, (vis, skymodel))| invert_one(i, vis, skymodel, imaging, docal))
        .collect()
}

fn invert_one(
    index: usize,
    vis: &Visibility,
    skymodel: &SkyModel,
    imaging: &dyn ImagingStage,
    docal: bool,
) -> Result<Inverted, SkymodelError> {
    let template = skymodel
        .image
        .as_ref()
        .ok_or(ConfigurationError::MissingImage(index))?;
    let mut result = match (docal, &skymodel.gaintable) {
        (true, Some(gt)) => {
            let corrected = apply_gaintable(vis.to_block()?, gt, true)?.to_flat();
            imaging.invert(&corrected, template, false)?
        }
        _ => imaging.invert(vis, template, false)?,
    };
    if let Some(mask) = &skymodel.mask {
        result.image = result.image.multiply_by(mask)?;
    }
    Ok(result)
}
