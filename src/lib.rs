// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Self-calibration and major-cycle imaging for radio interferometers.

The centre of the crate is [`pipeline::ical_pipeline`], which alternates
between solving for antenna-based instrumental corrections
([`calibration::calibrate`]) and refining a sky model by imaging and
deconvolution. Sky models can also be predicted into and inverted from
visibilities directly ([`skymodel`]).
 */

pub mod calibration;
pub mod constants;
pub mod coord;
mod error;
pub mod image;
pub mod imaging;
mod jones;
pub(crate) mod messages;
pub mod pipeline;
pub mod simulate;
pub mod skymodel;
pub mod vis;

// Re-exports.
pub use error::{ConfigurationError, HypericalError};
pub use jones::Jones;

#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
