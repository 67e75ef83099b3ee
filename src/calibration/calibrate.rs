// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solve for and remove a sequence of calibration terms.

use indexmap::IndexMap;
use log::{debug, warn};

use super::{
    apply_gaintable, create_gaintable_from_blockvisibility, qa_gaintable, solve_gaintable,
    CalibrateError, CalibrationContext, CalibrationControl, GainTable, JonesTerm, SolverSettings,
};
use crate::vis::{BlockVisibility, VisData};

/// The gain tables of the terms that were solved for, in the order that they
/// were solved.
pub type GainTables = IndexMap<JonesTerm, GainTable>;

/// Calibrate `vis` against `model_vis` for each term of `context` in turn
/// (e.g. "TGB" solves for T, then G, then B). Each term is solved for using
/// the visibilities corrected by all terms before it, and its inverse is
/// applied before moving on.
///
/// A term is only solved for when `iteration` has reached its
/// `first_iteration`; otherwise it is skipped and has no gain table. A term
/// whose solve fails for lack of data is also omitted, with a warning. Errors
/// that mean the inputs are inconsistent are returned.
///
/// The corrected visibilities are returned in the same representation as
/// `vis`.
pub fn calibrate(
    vis: VisData,
    model_vis: &VisData,
    context: &str,
    control: &CalibrationControl,
    iteration: usize,
    settings: &SolverSettings,
) -> Result<(VisData, GainTables), CalibrateError> {
    let terms = control.resolve_context(context)?;
    let flat_input = !vis.is_block();

    let mut working = vis.into_block()?;
    let converted_model;
    let model = match model_vis {
        VisData::Block(b) => b,
        VisData::Flat(v) => {
            converted_model = v.to_block()?;
            &converted_model
        }
    };
    if !working.same_layout(model) {
        return Err(CalibrateError::ShapeMismatch(format!(
            "{:?} vs. {:?}",
            working.vis.dim(),
            model.vis.dim()
        )));
    }

    let mut gaintables = GainTables::with_capacity(terms.len());
    for (term, term_context) in terms {
        if iteration < term_context.first_iteration {
            debug!(
                "Skipping calibration term {term} on iteration {iteration}; it starts at iteration {}",
                term_context.first_iteration
            );
            continue;
        }

        let gaintable = match solve_term(&working, model, term_context, settings) {
            Ok(gt) => gt,
            Err(e) if !e.is_fatal() => {
                warn!("Omitting calibration term {term} on iteration {iteration}: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!("Solved calibration term {term}: {}", qa_gaintable(&gaintable));
        working = apply_gaintable(working, &gaintable, true)?;
        gaintables.insert(term, gaintable);
    }

    let out = if flat_input {
        VisData::Flat(working.to_flat())
    } else {
        VisData::Block(working)
    };
    Ok((out, gaintables))
}

fn solve_term(
    vis: &BlockVisibility,
    model: &BlockVisibility,
    context: &CalibrationContext,
    settings: &SolverSettings,
) -> Result<GainTable, CalibrateError> {
    let scaffold = create_gaintable_from_blockvisibility(vis, context.timeslice, context.shape)?;
    solve_gaintable(vis, model, scaffold, context.phase_only, settings)
}
