// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Speed of light \[metres/second\]
pub const VEL_C: f64 = 299_792_458.0;

/// The default number of major cycles in an ICAL run.
pub const DEFAULT_NMAJOR: usize = 5;

/// The calibration terms solved for when nothing else is specified.
pub const DEFAULT_CALIBRATION_CONTEXT: &str = "TG";

/// Default maximum number of calibration loop iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Default threshold to use for calibration loops. If the largest change in a
/// gain between two even iterations is below this value, iteration stops.
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-8;

/// Default minimum threshold to use for calibration loops. Solutions that
/// haven't reached this value are marked as not converged.
pub const DEFAULT_MIN_THRESHOLD: f64 = 1e-4;

/// The minimum number of unflagged baselines an antenna needs in a time slice
/// before it is solved for.
pub const DEFAULT_MIN_ANTENNA_BASELINES: usize = 1;

/// Default loop gain for Högbom CLEAN.
pub const DEFAULT_CLEAN_GAIN: f64 = 0.1;

/// Default number of minor-cycle iterations per major cycle.
pub const DEFAULT_CLEAN_NITER: usize = 1000;

/// Default fraction of the residual peak at which a minor cycle stops.
pub const DEFAULT_CLEAN_FRACTIONAL_THRESHOLD: f64 = 0.1;

/// Sigma to FWHM conversion factor for a Gaussian, 2 sqrt(2 ln 2).
pub const FWHM_FACTOR: f64 = 2.354_820_045_030_949_3;
