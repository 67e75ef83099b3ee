// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::{
    calibration::{create_gaintable_from_blockvisibility, JonesShape, Timeslice},
    image::SkyGrid,
    imaging::DftImager,
    simulate::{simulate_visibility, ObservationLayout},
};

const FREQS: [f64; 2] = [150e6, 160e6];

fn vis() -> Visibility {
    simulate_visibility(&ObservationLayout::new(8, 2, 60.0, FREQS.to_vec()))
}

fn image() -> Image {
    let grid = SkyGrid::centred(4e-3, 24, 24, FREQS.to_vec()).unwrap();
    let mut image = Image::zeros(grid, 1, 24, 24).unwrap();
    image.data.slice_mut(s![.., 0, 10, 14]).fill(1.5);
    image
}

fn half_mask(image: &Image) -> Image {
    let mut mask = image.zeros_like();
    mask.data.slice_mut(s![.., .., .., ..12]).fill(1.0);
    mask.data.slice_mut(s![.., .., .., 12..]).fill(0.5);
    mask
}

#[test]
fn test_list_lengths_must_match() {
    let imager = DftImager::default();
    let vis_list = vec![vis(), vis()];
    let skymodels = vec![SkyModel::default()];
    let result = predict_skymodel(&vis_list, &skymodels, &imager, false);
    assert!(matches!(
        result,
        Err(SkymodelError::Configuration(
            ConfigurationError::ListLengthMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ))
    ));
    let result = invert_skymodel(&vis_list, &skymodels, &imager, false);
    assert!(matches!(
        result,
        Err(SkymodelError::Configuration(
            ConfigurationError::ListLengthMismatch { .. }
        ))
    ));
}

#[test]
fn test_empty_skymodel_predicts_zeros() {
    let imager = DftImager::default();
    let vis_list = vec![vis()];
    let predicted = predict_skymodel(&vis_list, &[SkyModel::default()], &imager, false).unwrap();
    assert_eq!(predicted[0], vis_list[0].zeroed_copy());
}

#[test]
fn test_component_at_phase_centre() {
    let imager = DftImager::default();
    let skymodel = SkyModel {
        components: vec![SkyComponent::unpolarised(0.0, 0.0, 2.0, FREQS.to_vec())],
        ..Default::default()
    };
    let predicted = predict_skymodel(&[vis()], &[skymodel], &imager, false).unwrap();
    for row in &predicted[0].rows {
        assert_abs_diff_eq!(row.vis, Jones::identity() * 2.0, epsilon = 1e-12);
    }
}

#[test]
fn test_components_and_image_match() {
    // A component at a pixel centre predicts the same as that pixel.
    let imager = DftImager::default();
    let image = image();
    let (l, m) = image.grid.pixel_to_lm(14.0, 10.0);
    let from_image = SkyModel {
        image: Some(image),
        ..Default::default()
    };
    let from_component = SkyModel {
        components: vec![SkyComponent::unpolarised(l, m, 1.5, FREQS.to_vec())],
        ..Default::default()
    };
    let vis_list = vec![vis(), vis()];
    let predicted =
        predict_skymodel(&vis_list, &[from_image, from_component], &imager, false).unwrap();
    for (a, b) in predicted[0].rows.iter().zip(predicted[1].rows.iter()) {
        assert_abs_diff_eq!(a.vis, b.vis, epsilon = 1e-10);
    }
}

#[test]
fn test_beam_applied_to_components() {
    let image = image();
    let mask = half_mask(&image);
    let (l_left, m) = image.grid.pixel_to_lm(3.0, 10.0);
    let (l_right, _) = image.grid.pixel_to_lm(20.0, 10.0);
    let (l_off, _) = image.grid.pixel_to_lm(40.0, 10.0);
    let components = vec![
        SkyComponent::unpolarised(l_left, m, 2.0, FREQS.to_vec()),
        SkyComponent::unpolarised(l_right, m, 2.0, FREQS.to_vec()),
        SkyComponent::unpolarised(l_off, m, 2.0, FREQS.to_vec()),
    ];
    let beamed = apply_beam_to_components(&components, &mask);
    assert_eq!(beamed[0].flux, array![[2.0], [2.0]]);
    assert_eq!(beamed[1].flux, array![[1.0], [1.0]]);
    assert_eq!(beamed[2].flux, array![[0.0], [0.0]]);
    // The input is untouched.
    assert_eq!(components[1].flux, array![[2.0], [2.0]]);
}

#[test]
fn test_masked_invert_is_unmasked_invert_times_mask() {
    let imager = DftImager::default();
    let image = image();
    let mask = half_mask(&image);
    let vis_list = vec![vis()];
    let unmasked = SkyModel {
        image: Some(image.clone()),
        ..Default::default()
    };
    let predicted = predict_skymodel(&vis_list, &[unmasked.clone()], &imager, false).unwrap();

    let masked = SkyModel {
        mask: Some(mask.clone()),
        ..unmasked.clone()
    };
    let plain = invert_skymodel(&predicted, &[unmasked], &imager, false).unwrap();
    let with_mask = invert_skymodel(&predicted, &[masked], &imager, false).unwrap();
    assert_eq!(with_mask[0].image, plain[0].image.multiply_by(&mask).unwrap());
    assert_eq!(with_mask[0].sumwt, plain[0].sumwt);
}

#[test]
fn test_invert_needs_an_image() {
    let imager = DftImager::default();
    let result = invert_skymodel(&[vis()], &[SkyModel::default()], &imager, false);
    assert!(matches!(
        result,
        Err(SkymodelError::Configuration(ConfigurationError::MissingImage(0)))
    ));
}

#[test]
fn test_mask_grid_is_validated() {
    let imager = DftImager::default();
    let image = image();
    let other_grid = SkyGrid::centred(5e-3, 24, 24, FREQS.to_vec()).unwrap();
    let mask = Image::zeros(other_grid, 1, 24, 24).unwrap();
    let skymodel = SkyModel {
        image: Some(image),
        mask: Some(mask),
        ..Default::default()
    };
    let result = predict_skymodel(&[vis()], &[skymodel], &imager, false);
    assert!(matches!(
        result,
        Err(SkymodelError::Configuration(
            ConfigurationError::MaskGridMismatch(0)
        ))
    ));
}

#[test]
fn test_docal_applies_gaintable() {
    let imager = DftImager::default();
    let vis = vis();
    let mut gaintable = create_gaintable_from_blockvisibility(
        &vis.to_block().unwrap(),
        Timeslice::Auto,
        JonesShape::Vector,
    )
    .unwrap();
    gaintable.gains.fill(Jones::identity() * 2.0);
    let skymodel = SkyModel {
        components: vec![SkyComponent::unpolarised(0.0, 0.0, 1.0, FREQS.to_vec())],
        gaintable: Some(gaintable),
        ..Default::default()
    };
    let vis_list = vec![vis];

    let plain = predict_skymodel(&vis_list, &[skymodel.clone()], &imager, false).unwrap();
    let corrupted = predict_skymodel(&vis_list, &[skymodel], &imager, true).unwrap();
    for (p, c) in plain[0].rows.iter().zip(corrupted[0].rows.iter()) {
        assert_abs_diff_eq!(p.vis * 4.0, c.vis, epsilon = 1e-12);
    }
}

#[test]
fn test_docal_invert_removes_gaintable() {
    let imager = DftImager::default();
    let image = image();
    let vis = vis();
    let mut gaintable = create_gaintable_from_blockvisibility(
        &vis.to_block().unwrap(),
        Timeslice::Auto,
        JonesShape::Vector,
    )
    .unwrap();
    gaintable.gains.fill(Jones::identity() * 2.0);
    let skymodel = SkyModel {
        image: Some(image),
        gaintable: Some(gaintable),
        ..Default::default()
    };
    let vis_list = vec![vis];
    let corrupted = predict_skymodel(&vis_list, &[skymodel.clone()], &imager, true).unwrap();
    let plain = predict_skymodel(&vis_list, &[skymodel.clone()], &imager, false).unwrap();

    let corrected = invert_skymodel(&corrupted, &[skymodel.clone()], &imager, true).unwrap();
    let expected = invert_skymodel(&plain, &[skymodel], &imager, false).unwrap();
    assert_abs_diff_eq!(
        corrected[0].image.data,
        expected[0].image.data,
        epsilon = 1e-10
    );
}
