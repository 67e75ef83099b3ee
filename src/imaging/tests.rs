// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::{
    image::{Image, SkyGrid},
    simulate::{simulate_visibility, ObservationLayout},
    Jones,
};

fn layout() -> ObservationLayout {
    ObservationLayout::new(10, 3, 60.0, vec![150e6, 160e6])
}

fn template(npol: usize) -> Image {
    let grid = SkyGrid::centred(3e-3, 32, 32, vec![155e6]).unwrap();
    Image::zeros(grid, npol, 32, 32).unwrap()
}

#[test]
fn test_predict_then_invert_recovers_point_source() {
    let mut model = template(1);
    model.data[(0, 0, 18, 13)] = 2.5;
    let imager = DftImager::default();
    let mut vis = simulate_visibility(&layout());
    imager.predict(&mut vis, &model).unwrap();

    let dirty = imager.invert(&vis, &model, false).unwrap();
    let plane = dirty.image.data.slice(s![0, 0, .., ..]);
    let (peak, value) = plane
        .indexed_iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    assert_eq!(peak, (18_usize, 13_usize));
    assert_abs_diff_eq!(*value, 2.5, epsilon = 1e-10);
    assert_abs_diff_eq!(dirty.sumwt[(0, 0)], vis.len() as f64);
}

#[test]
fn test_predict_adds_to_existing_data() {
    let mut model = template(1);
    model.data[(0, 0, 16, 16)] = 1.0;
    let imager = DftImager::default();
    let mut vis = simulate_visibility(&layout());
    imager.predict(&mut vis, &model).unwrap();
    // A source at the phase centre has the same visibility everywhere.
    for row in &vis.rows {
        assert_abs_diff_eq!(row.vis, Jones::identity(), epsilon = 1e-12);
    }
    imager.predict(&mut vis, &model).unwrap();
    assert_abs_diff_eq!(vis.rows[3].vis, Jones::identity() * 2.0, epsilon = 1e-12);
}

#[test]
fn test_polarised_predict_and_invert() {
    let mut model = template(4);
    let pols = [1.0, 0.2, -0.1, 0.7];
    for (p, v) in pols.iter().enumerate() {
        model.data[(0, p, 10, 20)] = *v;
    }
    let imager = DftImager::default();
    let mut vis = simulate_visibility(&layout());
    imager.predict(&mut vis, &model).unwrap();
    let dirty = imager.invert(&vis, &model, false).unwrap();
    for (p, v) in pols.iter().enumerate() {
        assert_abs_diff_eq!(dirty.image.data[(0, p, 10, 20)], *v, epsilon = 1e-10);
    }
}

#[test]
fn test_psf_peaks_at_the_centre() {
    let imager = DftImager::default();
    let vis = simulate_visibility(&layout());
    let psf = imager.invert(&vis, &template(1), true).unwrap();
    assert_abs_diff_eq!(psf.image.data[(0, 0, 16, 16)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(psf.image.max_abs(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_invert_ignores_flagged_samples() {
    let imager = DftImager::default();
    let mut vis = simulate_visibility(&layout());
    for row in vis.rows.iter_mut() {
        row.vis = Jones::identity();
    }
    vis.rows[0].vis = Jones::identity() * 1000.0;
    vis.rows[0].weight = -1.0;
    let dirty = imager.invert(&vis, &template(1), false).unwrap();
    assert_abs_diff_eq!(dirty.image.data[(0, 0, 16, 16)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(dirty.sumwt[(0, 0)], (vis.len() - 1) as f64);

    let mut all_flagged = vis.clone();
    all_flagged.rows.iter_mut().for_each(|r| r.weight = 0.0);
    let empty = imager.invert(&all_flagged, &template(1), false).unwrap();
    assert!(!empty.image.is_nontrivial());
    assert_abs_diff_eq!(empty.sumwt[(0, 0)], 0.0);
}

#[test]
fn test_sum_invert_results_weights_planes() {
    let mut a = template(1);
    a.data.fill(1.0);
    let mut b = template(1);
    b.data.fill(5.0);
    let results = [
        Inverted {
            image: a,
            sumwt: Array2::from_elem((1, 1), 1.0),
        },
        Inverted {
            image: b,
            sumwt: Array2::from_elem((1, 1), 3.0),
        },
    ];
    let summed = sum_invert_results(&results).unwrap();
    assert_abs_diff_eq!(summed.image.data[(0, 0, 5, 5)], 4.0);
    assert_abs_diff_eq!(summed.sumwt[(0, 0)], 4.0);

    assert!(matches!(
        sum_invert_results(&[]),
        Err(StageError::NothingToCombine)
    ));
    assert_eq!(sum_invert_results(&results[..1]).unwrap(), results[0]);
}

#[test]
fn test_hogbom_clean_finds_point_source() {
    let imager = DftImager::default();
    let mut model = template(1);
    model.data[(0, 0, 17, 15)] = 3.0;
    let mut vis = simulate_visibility(&layout());
    imager.predict(&mut vis, &model).unwrap();
    let dirty = imager.invert(&vis, &model, false).unwrap().image;
    let psf = imager.invert(&vis, &model.psf_template(), true).unwrap().image;

    let clean = HogbomClean::new(CleanParams {
        niter: 500,
        gain: 0.1,
        threshold: 0.0,
        fractional_threshold: 0.01,
    });
    let (components, list) = clean.clean(&dirty, &psf).unwrap();
    assert!(!list.is_empty());
    assert_eq!(list[0].y, 17);
    assert_eq!(list[0].x, 15);
    assert!(components.data[(0, 0, 17, 15)] > 0.95 * 3.0);

    // Deconvolution accumulates into the existing model.
    let mut existing = template(1);
    existing.data[(0, 0, 0, 0)] = 1.0;
    let updated = clean.deconvolve(&dirty, &psf, &existing).unwrap();
    assert_abs_diff_eq!(updated.data[(0, 0, 0, 0)], 1.0 + components.data[(0, 0, 0, 0)]);
    assert_abs_diff_eq!(
        updated.data[(0, 0, 17, 15)],
        components.data[(0, 0, 17, 15)]
    );
}

#[test]
fn test_psf_template_is_centred_on_the_image() {
    let image = template(1);
    let psf_template = image.psf_template();
    assert_eq!(psf_template.shape(), [1, 1, 64, 64]);
    let (l, m) = psf_template.grid.pixel_to_lm(32.0, 32.0);
    assert_abs_diff_eq!(l, 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!(m, 0.0, epsilon = 1e-15);

    let vis = simulate_visibility(&layout());
    let psf = DftImager::default()
        .invert(&vis, &psf_template, true)
        .unwrap()
        .image;
    assert_abs_diff_eq!(psf.data[(0, 0, 32, 32)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(psf.max_abs(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_clean_subtracts_sidelobes_at_the_edges() {
    // A source near a corner puts PSF sidelobes all over the image; with a
    // twice-size PSF every one of them is subtracted along with the peak.
    let imager = DftImager::default();
    let mut model = template(1);
    model.data[(0, 0, 29, 2)] = 3.0;
    let mut vis = simulate_visibility(&layout());
    imager.predict(&mut vis, &model).unwrap();
    let dirty = imager.invert(&vis, &model, false).unwrap().image;
    let psf = imager.invert(&vis, &model.psf_template(), true).unwrap().image;

    let clean = HogbomClean::new(CleanParams {
        niter: 500,
        gain: 0.1,
        threshold: 0.0,
        fractional_threshold: 0.01,
    });
    let (components, list) = clean.clean(&dirty, &psf).unwrap();
    assert!(list.len() < 500);
    assert!(list.iter().all(|c| (c.y, c.x) == (29, 2)));
    let total: f64 = components.data.sum();
    assert_abs_diff_eq!(total, 3.0, epsilon = 0.031);
}

#[test]
fn test_clean_rejects_bad_inputs() {
    let clean = HogbomClean::new(CleanParams {
        gain: 1.5,
        ..Default::default()
    });
    assert!(clean.clean(&template(1), &template(1)).is_err());

    let small_psf = Image::zeros(SkyGrid::centred(3e-3, 8, 8, vec![155e6]).unwrap(), 1, 8, 8)
        .unwrap();
    assert!(HogbomClean::default()
        .clean(&template(1), &small_psf)
        .is_err());
}

#[test]
fn test_restore_with_fixed_beam() {
    let imager = DftImager::new(DftImagingParams {
        restoring_beam_sigma: Some(1.5),
    });
    let mut model = template(1);
    model.data[(0, 0, 10, 10)] = 2.0;
    let mut residual = template(1);
    residual.data[(0, 0, 0, 0)] = 0.25;
    let restored = imager.restore(&model, &template(1), &residual).unwrap();
    assert_abs_diff_eq!(restored.data[(0, 0, 10, 10)], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
        restored.data[(0, 0, 10, 11)],
        2.0 * (-1.0_f64 / (2.0 * 1.5 * 1.5)).exp(),
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(restored.data[(0, 0, 0, 0)], 0.25, epsilon = 1e-12);
}

#[test]
fn test_estimate_beam_sigma() {
    let mut psf = template(1);
    let sigma: f64 = 2.0;
    for ((_, _, y, x), v) in psf.data.indexed_iter_mut() {
        let dy = y as f64 - 16.0;
        let dx = x as f64 - 16.0;
        *v = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
    }
    let estimate = estimate_beam_sigma(&psf).unwrap();
    assert_abs_diff_eq!(estimate, sigma, epsilon = 0.1);

    assert!(estimate_beam_sigma(&template(1)).is_err());
}

#[test]
fn test_restore_estimates_beam_from_psf() {
    let imager = DftImager::default();
    let vis = simulate_visibility(&layout());
    let psf = imager.invert(&vis, &template(1), true).unwrap().image;
    let mut model = template(1);
    model.data[(0, 0, 16, 16)] = 1.0;
    let restored = imager.restore(&model, &psf, &template(1)).unwrap();
    assert_abs_diff_eq!(restored.data[(0, 0, 16, 16)], 1.0, epsilon = 1e-12);
    assert!(restored.data[(0, 0, 16, 17)] > 0.0);
}
