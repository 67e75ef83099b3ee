// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky-model workflows over several partitions.

use approx::assert_abs_diff_eq;

use hyperical::{
    imaging::{sum_invert_results, DftImager, ImagingStage},
    skymodel::{invert_skymodel, predict_skymodel, SkyComponent, SkyModel},
};

use crate::*;

#[test]
fn test_components_and_images_predict_the_same_sky() {
    init_logging();
    let vis_list = observe(3);
    let imager = DftImager::default();
    let grid = grid();

    // The bright source as an image, the faint one as a component.
    let mut image = empty_model();
    let (y, x, flux) = SOURCES[0];
    image.data[(0, 0, y, x)] = flux;
    let (y, x, flux) = SOURCES[1];
    let (l, m) = grid.pixel_to_lm(x as f64, y as f64);
    let skymodel = SkyModel {
        image: Some(image),
        components: vec![SkyComponent::unpolarised(l, m, flux, vec![FREQ])],
        ..Default::default()
    };
    let skymodels = vec![skymodel; vis_list.len()];

    let predicted = predict_skymodel(&vis_list, &skymodels, &imager, false).unwrap();
    for (p, v) in predicted.iter().zip(vis_list.iter()) {
        for (a, b) in p.rows.iter().zip(v.rows.iter()) {
            assert_abs_diff_eq!(a.vis, b.vis, epsilon = 1e-9);
        }
    }

    let inverted = invert_skymodel(&predicted, &skymodels, &imager, false).unwrap();
    let dirty = sum_invert_results(&inverted).unwrap();
    let expected = sum_invert_results(
        &invert_skymodel(&vis_list, &skymodels, &imager, false).unwrap(),
    )
    .unwrap();
    assert_abs_diff_eq!(dirty.image.data, expected.image.data, epsilon = 1e-9);
    let total_weight: f64 = inverted.iter().map(|i| i.sumwt[(0, 0)]).sum();
    assert_abs_diff_eq!(dirty.sumwt[(0, 0)], total_weight);
}

#[test]
fn test_masked_skymodel_only_sees_the_window() {
    init_logging();
    let vis_list = observe(2);
    let imager = DftImager::default();

    // Only let the bright source through.
    let (y, x, flux) = SOURCES[0];
    let mut mask = empty_model();
    mask.data
        .slice_mut(ndarray::s![0, 0, y - 2..=y + 2, x - 2..=x + 2])
        .fill(1.0);
    let skymodel = SkyModel {
        image: Some(true_sky()),
        mask: Some(mask.clone()),
        ..Default::default()
    };
    let skymodels = vec![skymodel; vis_list.len()];

    let predicted = predict_skymodel(&vis_list, &skymodels, &imager, false).unwrap();
    let bright_only = {
        let mut sky = empty_model();
        sky.data[(0, 0, y, x)] = flux;
        sky
    };
    for (p, v) in predicted.iter().zip(vis_list.iter()) {
        let mut expected = v.zeroed_copy();
        imager.predict(&mut expected, &bright_only).unwrap();
        for (a, b) in p.rows.iter().zip(expected.rows.iter()) {
            assert_abs_diff_eq!(a.vis, b.vis, epsilon = 1e-9);
        }
    }

    let inverted = invert_skymodel(&vis_list, &skymodels, &imager, false).unwrap();
    for result in &inverted {
        let outside = result.image.data.iter().zip(mask.data.iter());
        for (value, m) in outside {
            if *m == 0.0 {
                assert_eq!(*value, 0.0);
            }
        }
    }
}
