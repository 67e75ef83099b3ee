// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from building and running pipelines.

use thiserror::Error;

use crate::{
    calibration::CalibrateError, image::ImageError, imaging::StageError,
    skymodel::SkymodelError, vis::VisError, ConfigurationError,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Calibrate(#[from] CalibrateError),

    /// Imaging and deconvolution failures are passed through untouched.
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Skymodel(#[from] SkymodelError),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Task {id} is not part of this graph, which has {len} tasks")]
    UnknownTask { id: usize, len: usize },

    #[error("Task '{task}' expected {expected} as input")]
    UnexpectedValue {
        task: String,
        expected: &'static str,
    },

    #[error("The output of task '{0}' was needed but isn't available")]
    MissingValue(String),
}

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("{0}")]
    ArgFile(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
