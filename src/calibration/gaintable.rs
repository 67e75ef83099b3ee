// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tables of per-antenna corrections.

use itertools::Itertools;
use ndarray::prelude::*;
use serde::Serialize;

use super::{CalibrateError, JonesShape, Timeslice};
use crate::{
    vis::{is_flagged_weight, BlockVisibility},
    Jones,
};

/// Corrections for each antenna, over a series of time slices and channels.
/// The slices are ascending and don't overlap.
#[derive(Clone, Debug, PartialEq)]
pub struct GainTable {
    pub shape: JonesShape,
    /// The centre of each time slice \[seconds\]
    pub times: Vec<f64>,
    /// The length of each time slice \[seconds\]
    pub intervals: Vec<f64>,
    /// \[Hz\]
    pub frequencies: Vec<f64>,
    /// Axes are (time slice, antenna, channel).
    pub gains: Array3<Jones>,
    /// Axes are (time slice, antenna, channel). Zero means flagged.
    pub weights: Array3<f64>,
    /// The final convergence precision of each (time slice, channel) solve.
    pub precisions: Array2<f64>,
    pub converged: Array2<bool>,
}

impl GainTable {
    /// A table of identity gains with unit weights.
    pub fn identity(
        shape: JonesShape,
        times: Vec<f64>,
        intervals: Vec<f64>,
        frequencies: Vec<f64>,
        num_antennas: usize,
    ) -> GainTable {
        let num_slices = times.len();
        let num_chans = frequencies.len();
        GainTable {
            shape,
            times,
            intervals,
            frequencies,
            gains: Array3::from_elem((num_slices, num_antennas, num_chans), Jones::identity()),
            weights: Array3::ones((num_slices, num_antennas, num_chans)),
            precisions: Array2::zeros((num_slices, num_chans)),
            converged: Array2::from_elem((num_slices, num_chans), false),
        }
    }

    pub fn num_slices(&self) -> usize {
        self.times.len()
    }

    pub fn num_antennas(&self) -> usize {
        self.gains.len_of(Axis(1))
    }

    pub fn num_chans(&self) -> usize {
        self.frequencies.len()
    }

    /// The time range covered by a slice, `[start, end)`.
    pub fn coverage(&self, i_slice: usize) -> (f64, f64) {
        let half = self.intervals[i_slice] / 2.0;
        (self.times[i_slice] - half, self.times[i_slice] + half)
    }

    /// Find the time slice that covers `time`. Times on the boundary between
    /// two slices belong to the later one.
    pub fn slice_of(&self, time: f64) -> Option<usize> {
        let after = self.times.partition_point(|&c| c <= time);
        let candidates = [after.checked_sub(1), Some(after)];
        let nearest = candidates
            .into_iter()
            .flatten()
            .filter(|&i| i < self.times.len())
            // Ties go to the later slice.
            .min_by(|&a, &b| {
                (time - self.times[a])
                    .abs()
                    .total_cmp(&(time - self.times[b]).abs())
                    .then(b.cmp(&a))
            })?;
        let half = self.intervals[nearest] / 2.0;
        // A slice of zero width still covers its own time.
        let tolerance = (half * 1e-9).max(1e-9);
        let offset = time - self.times[nearest];
        if offset >= -half - tolerance && offset < half + tolerance {
            Some(nearest)
        } else {
            None
        }
    }
}

/// Make an identity gain table that covers the times of `vis`. With
/// [`Timeslice::Auto`], there is one slice per unique time. Otherwise, slices
/// of the given length start at the first time, and only slices that contain
/// data are kept.
pub fn create_gaintable_from_blockvisibility(
    vis: &BlockVisibility,
    timeslice: Timeslice,
    shape: JonesShape,
) -> Result<GainTable, CalibrateError> {
    let t0 = *vis.times.first().ok_or(CalibrateError::NoData)?;
    let (times, intervals) = match timeslice.validate()? {
        Timeslice::Auto => (vis.times.clone(), auto_intervals(vis)),
        Timeslice::Seconds(ts) => {
            let times = vis
                .times
                .iter()
                .map(|&t| ((t - t0) / ts).round() as u64)
                .dedup()
                .map(|k| t0 + k as f64 * ts)
                .collect::<Vec<_>>();
            let intervals = vec![ts; times.len()];
            (times, intervals)
        }
    };
    Ok(GainTable::identity(
        shape,
        times,
        intervals,
        vis.frequencies.clone(),
        vis.num_antennas,
    ))
}

/// One slice per unique time. A slice is at least as wide as the spacing to
/// its nearest neighbouring time, so recorded integration times that are
/// missing or too short still leave every time covered.
fn auto_intervals(vis: &BlockVisibility) -> Vec<f64> {
    let times = &vis.times;
    times
        .iter()
        .zip(vis.integration_times.iter())
        .enumerate()
        .map(|(i, (&t, &integration_time))| {
            let before = i.checked_sub(1).map(|j| t - times[j]);
            let after = times.get(i + 1).map(|&next| next - t);
            let spacing = before
                .into_iter()
                .chain(after)
                .reduce(f64::min)
                .unwrap_or(0.0);
            if integration_time.is_finite() {
                integration_time.max(spacing)
            } else {
                spacing
            }
        })
        .collect()
}

/// Summary statistics of a gain table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainTableQa {
    pub shape: JonesShape,
    pub num_slices: usize,
    pub num_antennas: usize,
    pub num_chans: usize,
    /// The fraction of (slice, antenna, channel) gains that are flagged.
    pub flagged_fraction: f64,
    /// The fraction of (slice, channel) solves that converged.
    pub converged_fraction: f64,
    /// Mean and RMS of the unflagged parallel-hand gain amplitudes.
    pub amplitude_mean: f64,
    pub amplitude_rms: f64,
    /// RMS of the unflagged parallel-hand gain phases \[radians\]
    pub phase_rms: f64,
    pub max_precision: f64,
}

impl std::fmt::Display for GainTableQa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} gains, {}x{}x{} (slices x antennas x channels), {:.1}% flagged, {:.1}% converged, amplitude {:.4} ± {:.4}, phase RMS {:.4} rad",
            self.shape,
            self.num_slices,
            self.num_antennas,
            self.num_chans,
            self.flagged_fraction * 100.0,
            self.converged_fraction * 100.0,
            self.amplitude_mean,
            self.amplitude_rms,
            self.phase_rms,
        )
    }
}

pub fn qa_gaintable(gt: &GainTable) -> GainTableQa {
    let num_gains = gt.weights.len();
    let num_flagged = gt.weights.iter().filter(|&&w| is_flagged_weight(w)).count();
    let num_solves = gt.converged.len();
    let num_converged = gt.converged.iter().filter(|&&c| c).count();

    let elements: &[usize] = match gt.shape {
        JonesShape::Scalar => &[0],
        JonesShape::Vector | JonesShape::Matrix => &[0, 3],
    };
    let (mut n, mut amp_sum, mut amp_sq_sum, mut phase_sq_sum) = (0usize, 0.0, 0.0, 0.0);
    for (g, _) in gt
        .gains
        .iter()
        .zip(gt.weights.iter())
        .filter(|(g, w)| !is_flagged_weight(**w) && !g.any_nan())
    {
        for &e in elements {
            let amp = g[e].norm();
            n += 1;
            amp_sum += amp;
            amp_sq_sum += amp * amp;
            phase_sq_sum += g[e].arg().powi(2);
        }
    }
    let (amplitude_mean, amplitude_rms, phase_rms) = if n == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let n = n as f64;
        let mean = amp_sum / n;
        (
            mean,
            (amp_sq_sum / n - mean * mean).max(0.0).sqrt(),
            (phase_sq_sum / n).sqrt(),
        )
    };

    GainTableQa {
        shape: gt.shape,
        num_slices: gt.num_slices(),
        num_antennas: gt.num_antennas(),
        num_chans: gt.num_chans(),
        flagged_fraction: if num_gains == 0 {
            0.0
        } else {
            num_flagged as f64 / num_gains as f64
        },
        converged_fraction: if num_solves == 0 {
            0.0
        } else {
            num_converged as f64 / num_solves as f64
        },
        amplitude_mean,
        amplitude_rms,
        phase_rms,
        max_precision: gt.precisions.iter().copied().fold(0.0, f64::max),
    }
}
