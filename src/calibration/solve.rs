// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solve for per-antenna gains with an alternating least-squares iteration.
//!
//! The update is the same as "MitchCal", equation 11 of Mitchell et al.
//! <https://ui.adsabs.harvard.edu/abs/2008ISTSP...2..707M/abstract>, and
//! follows StefCal in averaging the last two estimates on every even
//! iteration.

use itertools::Itertools;
use log::{debug, trace, warn};
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{CalibrateError, GainTable, JonesShape};
use crate::{
    c64,
    constants::{
        DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_ANTENNA_BASELINES, DEFAULT_MIN_THRESHOLD,
        DEFAULT_STOP_THRESHOLD,
    },
    vis::BlockVisibility,
    Jones,
};

/// Controls for the gain solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Iteration stops once every antenna's change between even iterations
    /// is below this.
    pub stop_threshold: f64,
    /// Solutions whose final change exceeds this are not converged. The
    /// change is the size of the last step, not the misfit to the data, so
    /// a slowly converging solve can be marked converged while still some
    /// way from the answer.
    pub min_threshold: f64,
    /// Antennas with fewer unflagged baselines than this in a time slice are
    /// not solved for.
    pub min_antenna_baselines: usize,
    /// Treat antennas that can't be solved for as an error, rather than
    /// flagging them.
    pub fail_on_insufficient_data: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            min_threshold: DEFAULT_MIN_THRESHOLD,
            min_antenna_baselines: DEFAULT_MIN_ANTENNA_BASELINES,
            fail_on_insufficient_data: false,
        }
    }
}

/// A single unflagged cross-correlation.
#[derive(Clone, Copy, Debug)]
struct Sample {
    antenna1: usize,
    antenna2: usize,
    weight: f64,
    data: Jones,
    model: Jones,
}

/// An antenna that couldn't be solved for.
#[derive(Clone, Copy, Debug)]
struct Insufficient {
    antenna: usize,
    baselines: usize,
}

#[derive(Debug)]
struct CalibrationResult {
    num_iterations: u32,
    converged: bool,
    max_precision: f64,
    num_failed: usize,
}

/// The solution of a single (time slice, channel) cell.
struct CellSolution {
    gains: Vec<Jones>,
    weights: Vec<f64>,
    result: CalibrationResult,
    insufficient: Vec<Insufficient>,
}

/// Solve for the gains that best turn `model_vis` into `vis`, i.e. `V_ij = G_i
/// M_ij G_j^H`, for every time slice and channel of `gaintable`. The shape of
/// `gaintable` sets the kind of gain solved for; matrix gains include
/// polarisation leakage. With `phase_only`, gain amplitudes are held at 1.
///
/// Antennas that have no data in a slice are flagged with identity gains. If
/// there is nothing usable at all (e.g. the model is empty),
/// [`CalibrateError::NoData`] is returned.
/// Antennas with too few baselines are flagged the same way, unless
/// [`SolverSettings::fail_on_insufficient_data`] is set.
pub fn solve_gaintable(
    vis: &BlockVisibility,
    model_vis: &BlockVisibility,
    mut gaintable: GainTable,
    phase_only: bool,
    settings: &SolverSettings,
) -> Result<GainTable, CalibrateError> {
    if !vis.same_layout(model_vis) {
        return Err(CalibrateError::ShapeMismatch(format!(
            "{:?} vs. {:?}",
            vis.vis.dim(),
            model_vis.vis.dim()
        )));
    }
    if gaintable.num_antennas() != vis.num_antennas {
        return Err(CalibrateError::AntennaMismatch {
            gaintable: gaintable.num_antennas(),
            vis: vis.num_antennas,
        });
    }
    if gaintable.num_chans() != vis.num_chans() {
        return Err(CalibrateError::ChannelMismatch {
            gaintable: gaintable.num_chans(),
            vis: vis.num_chans(),
        });
    }
    if vis.num_times() == 0 {
        return Err(CalibrateError::NoData);
    }

    let mut slice_timesteps = vec![vec![]; gaintable.num_slices()];
    for (i_time, &time) in vis.times.iter().enumerate() {
        if let Some(i_slice) = gaintable.slice_of(time) {
            slice_timesteps[i_slice].push(i_time);
        }
    }

    let num_antennas = vis.num_antennas;
    let shape = gaintable.shape;
    let cells: Vec<(usize, usize, Vec<Sample>)> = (0..gaintable.num_slices())
        .cartesian_product(0..gaintable.num_chans())
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(i_slice, i_chan)| {
            let samples = gather_samples(vis, model_vis, &slice_timesteps[i_slice], i_chan, shape);
            (i_slice, i_chan, samples)
        })
        .collect();
    if cells.iter().all(|(_, _, samples)| samples.is_empty()) {
        debug!("No usable samples to solve {shape} gains with");
        return Err(CalibrateError::NoData);
    }
    let solutions: Vec<(usize, usize, CellSolution)> = cells
        .into_par_iter()
        .map(|(i_slice, i_chan, samples)| {
            let solution = solve_cell(&samples, num_antennas, shape, phase_only, settings);
            (i_slice, i_chan, solution)
        })
        .collect();

    let mut num_converged = 0;
    for (i_slice, i_chan, solution) in solutions {
        let time = gaintable.times[i_slice];
        if let Some(insufficient) = solution.insufficient.first() {
            if settings.fail_on_insufficient_data {
                return Err(CalibrateError::InsufficientData {
                    time,
                    antenna: insufficient.antenna,
                    channel: i_chan,
                    baselines: insufficient.baselines,
                    required: settings.min_antenna_baselines,
                });
            }
        }
        for insufficient in &solution.insufficient {
            debug!(
                "Flagging antenna {} at {time}s, channel {i_chan}: only {} unflagged baselines",
                insufficient.antenna, insufficient.baselines
            );
        }
        trace!(
            "Slice {i_slice} ({time}s), channel {i_chan}: {} iterations, precision {:e}, {} antennas failed",
            solution.result.num_iterations,
            solution.result.max_precision,
            solution.result.num_failed
        );
        if solution.result.converged {
            num_converged += 1;
        }

        gaintable
            .gains
            .slice_mut(s![i_slice, .., i_chan])
            .assign(&Array1::from(solution.gains));
        gaintable
            .weights
            .slice_mut(s![i_slice, .., i_chan])
            .assign(&Array1::from(solution.weights));
        gaintable.precisions[(i_slice, i_chan)] = solution.result.max_precision;
        gaintable.converged[(i_slice, i_chan)] = solution.result.converged;
    }

    let num_cells = gaintable.converged.len();
    if num_converged < num_cells {
        warn!(
            "{} of {num_cells} {} gain solutions did not converge to the minimum threshold ({:e})",
            num_cells - num_converged,
            shape,
            settings.min_threshold
        );
    } else {
        debug!("All {num_cells} {shape} gain solutions converged");
    }
    Ok(gaintable)
}

fn gather_samples(
    vis: &BlockVisibility,
    model_vis: &BlockVisibility,
    timesteps: &[usize],
    i_chan: usize,
    shape: JonesShape,
) -> Vec<Sample> {
    let mut samples = vec![];
    for &i_time in timesteps {
        for (i_bl, bl) in vis.baselines.iter().enumerate() {
            if bl.is_auto() || vis.is_flagged(i_time, i_bl, i_chan) {
                continue;
            }
            let data = vis.vis[(i_time, i_bl, i_chan)];
            let model = model_vis.vis[(i_time, i_bl, i_chan)];
            // A zero model carries no information about the gains.
            if data.any_nan() || model.any_nan() || model.norm_sqr() == 0.0 {
                continue;
            }
            // Only matrix gains can use the cross hands.
            let (data, model) = match shape {
                JonesShape::Matrix => (data, model),
                JonesShape::Scalar | JonesShape::Vector => {
                    (data.parallel_hands(), model.parallel_hands())
                }
            };
            samples.push(Sample {
                antenna1: bl.antenna1,
                antenna2: bl.antenna2,
                weight: vis.weights[(i_time, i_bl, i_chan)],
                data,
                model,
            });
        }
    }
    samples
}

/// Work out which antennas can be solved for, iteratively removing those with
/// too few baselines. Returns the active antennas and the samples between
/// them.
fn prune_antennas(
    mut samples: Vec<Sample>,
    num_antennas: usize,
    min_baselines: usize,
) -> (Vec<bool>, Vec<Sample>, Vec<Insufficient>) {
    let mut insufficient = vec![];
    let mut active = vec![false; num_antennas];
    loop {
        let mut connected = Array2::from_elem((num_antennas, num_antennas), false);
        for s in &samples {
            connected[(s.antenna1, s.antenna2)] = true;
            connected[(s.antenna2, s.antenna1)] = true;
        }
        let counts = connected
            .outer_iter()
            .map(|row| row.iter().filter(|&&c| c).count())
            .collect::<Vec<_>>();
        active.iter_mut().zip(counts.iter()).for_each(|(a, &c)| *a = c > 0);

        let mut removed = false;
        for (antenna, &baselines) in counts.iter().enumerate() {
            if baselines > 0 && baselines < min_baselines {
                insufficient.push(Insufficient { antenna, baselines });
                active[antenna] = false;
                removed = true;
            }
        }
        if !removed {
            return (active, samples, insufficient);
        }
        samples.retain(|s| active[s.antenna1] && active[s.antenna2]);
    }
}

fn solve_cell(
    samples: &[Sample],
    num_antennas: usize,
    shape: JonesShape,
    phase_only: bool,
    settings: &SolverSettings,
) -> CellSolution {
    let (active, samples, insufficient) = prune_antennas(
        samples.to_vec(),
        num_antennas,
        settings.min_antenna_baselines.max(1),
    );

    let mut gains = vec![Jones::identity(); num_antennas];
    let mut old_gains = gains.clone();
    let mut top = vec![Jones::zero(); num_antennas];
    let mut bot = vec![Jones::zero(); num_antennas];
    let mut precisions = vec![f64::INFINITY; num_antennas];
    let mut failed = active.iter().map(|a| !a).collect::<Vec<_>>();

    let update = |top: &Jones, bot: &Jones| -> Jones {
        let new = match shape {
            JonesShape::Scalar => {
                let num = top[0] + top[3];
                let den = bot[0] + bot[3];
                Jones::scalar(num / den)
            }
            JonesShape::Vector => Jones::diag(top[0] / bot[0], top[3] / bot[3]),
            JonesShape::Matrix => *top / *bot,
        };
        if phase_only {
            unit_amplitude(new)
        } else {
            new
        }
    };

    let mut iteration = 0;
    let num_active = active.iter().filter(|&&a| a).count();
    while num_active > 0 && iteration < settings.max_iterations {
        iteration += 1;
        top.fill(Jones::zero());
        bot.fill(Jones::zero());
        calibration_loop(&samples, &gains, &mut top, &mut bot);

        for (((gain, old), (top, bot)), failed) in gains
            .iter_mut()
            .zip(old_gains.iter_mut())
            .zip(top.iter().zip(bot.iter()))
            .zip(failed.iter_mut())
            .filter(|(_, failed)| !**failed)
        {
            let new = update(top, bot);
            if new.any_nan() {
                *failed = true;
                *gain = Jones::identity();
                *old = Jones::identity();
            } else {
                *gain = new;
            }
        }

        // On every even iteration, test for convergence and set the new gain
        // solution as the average of the last two.
        if iteration % 2 == 0 {
            for (((gain, old), precision), _) in gains
                .iter_mut()
                .zip(old_gains.iter())
                .zip(precisions.iter_mut())
                .zip(failed.iter())
                .filter(|(_, failed)| !**failed)
            {
                *precision = (*gain - *old).norm_sqr();
                *gain = (*gain + *old) * 0.5;
                if phase_only {
                    *gain = unit_amplitude(*gain);
                }
            }
            if precisions
                .iter()
                .zip(failed.iter())
                .filter(|(_, failed)| !**failed)
                .all(|(&p, _)| p < settings.stop_threshold)
            {
                break;
            }
        }
        old_gains.clone_from(&gains);
    }

    let max_precision = precisions
        .iter()
        .zip(failed.iter())
        .filter(|(_, failed)| !**failed)
        .fold(0.0, |acc: f64, (&p, _)| acc.max(p));
    let num_failed = failed
        .iter()
        .zip(active.iter())
        .filter(|(f, a)| **f && **a)
        .count();
    let num_solved = num_active - num_failed;
    let converged = num_solved > 0 && max_precision <= settings.min_threshold;

    phase_reference(&mut gains, &failed, shape);

    let mut weights = vec![0.0; num_antennas];
    for s in &samples {
        weights[s.antenna1] += s.weight;
        weights[s.antenna2] += s.weight;
    }
    for ((gain, weight), &failed) in gains.iter_mut().zip(weights.iter_mut()).zip(failed.iter()) {
        if failed {
            *gain = Jones::identity();
            *weight = 0.0;
        }
    }

    CellSolution {
        gains,
        weights,
        result: CalibrationResult {
            num_iterations: iteration,
            converged,
            max_precision: if num_solved > 0 { max_precision } else { 0.0 },
            num_failed,
        },
        insufficient,
    }
}

/// Sum the numerator ("top") and denominator ("bot") of the gain update for
/// each antenna.
#[allow(non_snake_case)]
fn calibration_loop(samples: &[Sample], gains: &[Jones], top: &mut [Jones], bot: &mut [Jones]) {
    for s in samples {
        let D = s.data;
        let M = s.model;
        let w = s.weight;

        // For antenna 1, ( D G M^H ) / ( (M G^H) (M G^H)^H )
        let J2 = gains[s.antenna2];
        let Z = J2 * M.h();
        top[s.antenna1] += D * Z * w;
        bot[s.antenna1] += Z.h() * Z * w;

        // For antenna 2, ( D^H G M ) / ( (G M)^H (G M) )
        let J1 = gains[s.antenna1];
        let Z = J1 * M;
        top[s.antenna2] += D.h() * Z * w;
        bot[s.antenna2] += Z.h() * Z * w;
    }
}

/// Scale the parallel-hand elements to unit amplitude. Zero elements are left
/// alone.
fn unit_amplitude(mut j: Jones) -> Jones {
    for i in [0, 3] {
        let norm = j[i].norm();
        if norm > 0.0 {
            j[i] /= norm;
        }
    }
    j
}

/// Rotate all gains so that the first solved antenna has zero phase. Vector
/// gains are referenced per polarisation; other shapes use the X phase.
fn phase_reference(gains: &mut [Jones], failed: &[bool], shape: JonesShape) {
    let Some(reference) = gains
        .iter()
        .zip(failed.iter())
        .find(|(_, f)| !**f)
        .map(|(g, _)| *g)
    else {
        return;
    };
    let rotation = |e: c64| {
        let norm = e.norm();
        if norm > 0.0 {
            e.conj() / norm
        } else {
            c64::new(1.0, 0.0)
        }
    };
    let rx = rotation(reference[0]);
    let ry = rotation(reference[3]);
    for (gain, _) in gains.iter_mut().zip(failed.iter()).filter(|(_, f)| !**f) {
        match shape {
            JonesShape::Vector => {
                gain[0] *= rx;
                gain[3] *= ry;
            }
            JonesShape::Scalar | JonesShape::Matrix => *gain *= rx,
        }
    }
}
