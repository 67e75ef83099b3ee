// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Apply gain tables to visibilities.

use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;

use super::{CalibrateError, GainTable};
use crate::{
    vis::{is_flagged_weight, BlockVisibility},
    Jones,
};

/// Apply the gains in `gaintable` to `vis`, i.e. `V' = G_i V G_j^H`. With
/// `inverse`, the gains are removed instead, i.e. `V' = G_i^-1 V G_j^-H`.
///
/// Samples whose time isn't covered by any of the table's slices, or that
/// involve a flagged or singular gain, are flagged and otherwise left
/// untouched. A table with a single channel applies to all channels.
pub fn apply_gaintable(
    mut vis: BlockVisibility,
    gaintable: &GainTable,
    inverse: bool,
) -> Result<BlockVisibility, CalibrateError> {
    if gaintable.num_antennas() != vis.num_antennas {
        return Err(CalibrateError::AntennaMismatch {
            gaintable: gaintable.num_antennas(),
            vis: vis.num_antennas,
        });
    }
    if gaintable.num_chans() != 1 && gaintable.num_chans() != vis.num_chans() {
        return Err(CalibrateError::ChannelMismatch {
            gaintable: gaintable.num_chans(),
            vis: vis.num_chans(),
        });
    }

    // Get the Jones matrices to apply up front, with NaN standing in for
    // anything unusable.
    let jones: Array3<Jones> = ndarray::Zip::from(&gaintable.gains)
        .and(&gaintable.weights)
        .map_collect(|&g, &w| {
            if is_flagged_weight(w) {
                Jones::nan()
            } else if inverse {
                g.inv()
            } else {
                g
            }
        });
    let slices = vis
        .times
        .iter()
        .map(|&t| gaintable.slice_of(t))
        .collect::<Vec<_>>();
    let broadcast = gaintable.num_chans() == 1;
    let baselines = &vis.baselines;

    let num_flagged: usize = vis
        .vis
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(vis.weights.axis_iter_mut(Axis(0)))
        .zip(slices.par_iter())
        .map(|((mut vis_bf, mut weights_bf), i_slice)| {
            let mut num_flagged = 0;
            for ((mut vis_f, mut weights_f), bl) in vis_bf
                .outer_iter_mut()
                .zip(weights_bf.outer_iter_mut())
                .zip(baselines.iter())
            {
                for (i_chan, (vis, weight)) in
                    vis_f.iter_mut().zip(weights_f.iter_mut()).enumerate()
                {
                    let usable = i_slice.and_then(|i_slice| {
                        let i_gain_chan = if broadcast { 0 } else { i_chan };
                        let j1 = jones[(i_slice, bl.antenna1, i_gain_chan)];
                        let j2 = jones[(i_slice, bl.antenna2, i_gain_chan)];
                        if j1.any_nan() || j2.any_nan() {
                            None
                        } else {
                            Some((j1, j2))
                        }
                    });
                    match usable {
                        Some((j1, j2)) => *vis = j1 * *vis * j2.h(),
                        None => {
                            if !is_flagged_weight(*weight) {
                                num_flagged += 1;
                            }
                            *weight = -weight.abs();
                        }
                    }
                }
            }
            num_flagged
        })
        .sum();

    if num_flagged > 0 {
        debug!(
            "Flagged {num_flagged} samples without usable {} gains while {}",
            gaintable.shape,
            if inverse { "correcting" } else { "corrupting" }
        );
    }
    Ok(vis)
}
