// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Generate simple, deterministic observations. Useful for testing and
//! benchmarking the calibration and imaging machinery.

use itertools::Itertools;
use log::debug;

use crate::{
    c64,
    coord::UVW,
    vis::{Baseline, VisRow, Visibility},
    Jones,
};

/// The golden angle \[radians\]; spreads antennas evenly over a spiral.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Earth rotation rate \[radians/second\]
const EARTH_ROTATION: f64 = 7.292_115e-5;

/// The shape of a simulated observation.
#[derive(Clone, Debug)]
pub struct ObservationLayout {
    pub num_antennas: usize,
    /// \[seconds\]
    pub times: Vec<f64>,
    /// \[seconds\]
    pub integration_time: f64,
    /// \[Hz\]
    pub frequencies: Vec<f64>,
    /// The largest antenna distance from the array centre \[metres\]
    pub max_radius: f64,
}

impl ObservationLayout {
    /// `num_times` integrations of `integration_time` seconds, starting at 0.
    pub fn new(
        num_antennas: usize,
        num_times: usize,
        integration_time: f64,
        frequencies: Vec<f64>,
    ) -> ObservationLayout {
        ObservationLayout {
            num_antennas,
            times: (0..num_times)
                .map(|i| (i as f64 + 0.5) * integration_time)
                .collect(),
            integration_time,
            frequencies,
            max_radius: 100.0,
        }
    }

    /// Antenna positions in a plane perpendicular to the phase centre
    /// \[metres\].
    pub fn antenna_positions(&self) -> Vec<(f64, f64)> {
        let n = self.num_antennas.max(1) as f64;
        (0..self.num_antennas)
            .map(|i| {
                let r = self.max_radius * ((i as f64 + 0.5) / n).sqrt();
                let (s, c) = (i as f64 * GOLDEN_ANGLE).sin_cos();
                (r * c, r * s)
            })
            .collect()
    }

    /// All cross-correlation baselines.
    pub fn baselines(&self) -> Vec<Baseline> {
        (0..self.num_antennas)
            .tuple_combinations()
            .map(|(a1, a2)| Baseline::new(a1, a2))
            .collect()
    }
}

/// Make zeroed visibilities with unit weights, ordered by time, then
/// baseline, then channel. UVWs rotate with the Earth.
pub fn simulate_visibility(layout: &ObservationLayout) -> Visibility {
    let positions = layout.antenna_positions();
    let baselines = layout.baselines();
    let mut rows =
        Vec::with_capacity(layout.times.len() * baselines.len() * layout.frequencies.len());
    for &time in &layout.times {
        let (s, c) = (time * EARTH_ROTATION).sin_cos();
        for &baseline in &baselines {
            let (x1, y1) = positions[baseline.antenna1];
            let (x2, y2) = positions[baseline.antenna2];
            let (dx, dy) = (x1 - x2, y1 - y2);
            let uvw = UVW {
                u: c * dx - s * dy,
                v: s * dx + c * dy,
                w: 0.0,
            };
            for (channel, &frequency) in layout.frequencies.iter().enumerate() {
                rows.push(VisRow {
                    time,
                    integration_time: layout.integration_time,
                    baseline,
                    channel,
                    frequency,
                    uvw,
                    vis: Jones::zero(),
                    weight: 1.0,
                });
            }
        }
    }
    debug!(
        "Simulated {} visibilities over {} antennas",
        rows.len(),
        layout.num_antennas
    );
    Visibility::new(layout.num_antennas, rows)
}

/// A smoothly-varying, deterministic diagonal gain for each antenna.
pub fn antenna_gains(
    num_antennas: usize,
    amplitude_scatter: f64,
    phase_scatter: f64,
) -> Vec<Jones> {
    (0..num_antennas)
        .map(|i| {
            let x = i as f64;
            let gx = (1.0 + amplitude_scatter * (1.3 * x).sin())
                * c64::cis(phase_scatter * (0.7 * x).sin());
            let gy = (1.0 + amplitude_scatter * (0.9 * x).cos())
                * c64::cis(phase_scatter * (1.1 * x).cos());
            Jones::diag(gx, gy)
        })
        .collect()
}

/// Corrupt visibilities with per-antenna gains: `G1 V G2^H`.
pub fn corrupt_visibility(vis: &mut Visibility, gains: &[Jones]) {
    for row in vis.rows.iter_mut() {
        let g1 = gains[row.baseline.antenna1];
        let g2 = gains[row.baseline.antenna2];
        row.vis = g1 * row.vis * g2.h();
    }
}
