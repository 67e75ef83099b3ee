// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Self-calibration.

A calibration context string like "TGB" names a sequence of Jones terms, each
solved for against a model and then removed from the data before the next
term is solved for. How each term is solved for (its shape, solution interval
and whether only phases are fitted) comes from a [`CalibrationControl`].
 */

mod apply;
mod calibrate;
mod context;
mod error;
mod gaintable;
mod solve;

pub use apply::apply_gaintable;
pub use calibrate::{calibrate, GainTables};
pub use context::{
    calibration_contexts, CalibrationContext, CalibrationControl, JonesShape, JonesTerm,
    Timeslice,
};
pub use error::CalibrateError;
pub use gaintable::{create_gaintable_from_blockvisibility, qa_gaintable, GainTable, GainTableQa};
pub use solve::{solve_gaintable, SolverSettings};
