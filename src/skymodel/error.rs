// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from sky-model prediction and inversion.

use thiserror::Error;

use crate::{
    calibration::CalibrateError, image::ImageError, imaging::StageError, vis::VisError,
    ConfigurationError,
};

#[derive(Error, Debug)]
pub enum SkymodelError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Calibrate(#[from] CalibrateError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Vis(#[from] VisError),
}
