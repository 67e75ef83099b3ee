// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from imaging and deconvolution stages.

use thiserror::Error;

use crate::{image::ImageError, vis::VisError};

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error("There are no inverted images to combine")]
    NothingToCombine,

    #[error("Imaging failed: {0}")]
    Imaging(String),

    #[error("Deconvolution failed: {0}")]
    Deconvolution(String),
}
