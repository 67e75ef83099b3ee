// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Full pipeline runs on simulated data.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use indoc::indoc;

use hyperical::{
    calibration::{CalibrationContext, CalibrationControl, JonesShape, JonesTerm, Timeslice},
    imaging::{CleanParams, DftImager, HogbomClean},
    pipeline::{
        continuum_imaging_pipeline, ical_pipeline, IcalArgs, IcalParams, LogObserver,
        NullObserver,
    },
    simulate::{antenna_gains, corrupt_visibility},
};

use crate::*;

fn cleaner() -> Arc<HogbomClean> {
    Arc::new(HogbomClean::new(CleanParams {
        niter: 500,
        gain: 0.1,
        ..Default::default()
    }))
}

fn phase_only_params() -> IcalParams {
    let control = CalibrationControl::default()
        .with_context(
            JonesTerm::G,
            CalibrationContext {
                shape: JonesShape::Vector,
                timeslice: Timeslice::Auto,
                phase_only: true,
                first_iteration: 0,
            },
        )
        .unwrap();
    IcalParams {
        nmajor: 5,
        first_selfcal: Some(1),
        calibration_context: "G".to_string(),
        control,
        ..Default::default()
    }
}

#[test]
fn test_ical_without_corruption_recovers_the_sky() {
    init_logging();
    let output = ical_pipeline(
        observe(2),
        empty_model(),
        Arc::new(DftImager::default()),
        cleaner(),
        &IcalParams {
            nmajor: 4,
            ..Default::default()
        },
        &LogObserver,
    )
    .unwrap();

    for (y, x, flux) in SOURCES {
        assert_abs_diff_eq!(flux_near(&output.model, y, x), flux, epsilon = 0.05 * flux);
    }
    assert!(output.residual.max_abs() < 0.05);
    assert!(output.gaintables.iter().all(|g| g.is_empty()));
}

#[test]
fn test_selfcal_improves_corrupted_data() {
    init_logging();
    let mut observed = observe(2);
    let gains = antenna_gains(10, 0.0, 0.8);
    for vis in observed.iter_mut() {
        corrupt_visibility(vis, &gains);
    }
    let params = phase_only_params();

    let selfcal = ical_pipeline(
        observed.clone(),
        empty_model(),
        Arc::new(DftImager::default()),
        cleaner(),
        &params,
        &LogObserver,
    )
    .unwrap();
    let plain = continuum_imaging_pipeline(
        observed,
        empty_model(),
        Arc::new(DftImager::default()),
        cleaner(),
        &params,
        &NullObserver,
    )
    .unwrap();

    let (y, x, flux) = SOURCES[0];
    let selfcal_error = (flux_near(&selfcal.model, y, x) - flux).abs();
    let plain_error = (flux_near(&plain.model, y, x) - flux).abs();
    assert!(
        selfcal_error < plain_error,
        "self-calibrated error {selfcal_error} isn't better than {plain_error}"
    );

    assert_eq!(selfcal.gaintables.len(), 2);
    for tables in &selfcal.gaintables {
        let g = &tables[&JonesTerm::G];
        assert_eq!(g.num_slices(), 4);
        // Phase-only gains have unit amplitude.
        for gain in g.gains.iter() {
            assert_abs_diff_eq!(gain[0].norm(), 1.0, epsilon = 1e-10);
            assert_abs_diff_eq!(gain[3].norm(), 1.0, epsilon = 1e-10);
        }
    }
    assert!(plain.gaintables.iter().all(|g| g.is_empty()));
}

#[test]
fn test_ical_from_argument_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ical.toml");
    std::fs::write(
        &path,
        indoc! {r#"
            [ical]
            nmajor = 2
            first_selfcal = 1
            calibration_context = "T"

            [clean]
            niter = 300
            gain = 0.2

            [imaging]
            restoring_beam_sigma = 1.0
        "#},
    )
    .unwrap();
    let args = IcalArgs::from_file(&path).unwrap();

    let observed = observe(1);
    let output = ical_pipeline(
        observed,
        empty_model(),
        Arc::new(DftImager::new(args.imaging)),
        Arc::new(HogbomClean::new(args.clean)),
        &args.ical,
        &NullObserver,
    )
    .unwrap();
    assert!(output.gaintables[0].contains_key(&JonesTerm::T));
    let (y, x, _) = SOURCES[0];
    let (peak, _) = output
        .restored
        .data
        .indexed_iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    assert_eq!(peak, (0, 0, y, x));
}
