// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types for all hyperical-related errors.

use thiserror::Error;

use crate::calibration::JonesTerm;

/// A problem with how a run was set up. These are always detected before any
/// calibration or imaging work is done.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Got {got} {what}, but expected {expected} to match the visibility list")]
    ListLengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Unknown calibration term '{0}'; valid terms are T, G, P, B and I")]
    UnknownTerm(char),

    #[error("Calibration term '{0}' has no entry in the calibration control")]
    MissingContext(JonesTerm),

    #[error("Invalid Jones shape '{0}'; valid shapes are scalar, vector and matrix")]
    InvalidShape(String),

    #[error("Invalid time slice '{0}'; expected \"auto\" or a positive number of seconds")]
    InvalidTimeslice(String),

    #[error("The visibility list is empty")]
    EmptyVisList,

    #[error("The mask of sky model {0} is not on the same grid as its image")]
    MaskGridMismatch(usize),

    #[error("Sky model {0} has no image to use as an imaging template")]
    MissingImage(usize),

    #[error("{0}")]
    Invalid(String),
}

/// All errors that a hyperical user might see.
#[derive(Error, Debug)]
pub enum HypericalError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Vis(#[from] crate::vis::VisError),

    #[error(transparent)]
    Image(#[from] crate::image::ImageError),

    #[error(transparent)]
    Calibrate(#[from] crate::calibration::CalibrateError),

    #[error(transparent)]
    Stage(#[from] crate::imaging::StageError),

    #[error(transparent)]
    Skymodel(#[from] crate::skymodel::SkymodelError),

    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error(transparent)]
    Params(#[from] crate::pipeline::ParamsError),
}
