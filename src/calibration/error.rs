// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from solving for and applying calibration terms.

use thiserror::Error;

use crate::{vis::VisError, ConfigurationError};

#[derive(Error, Debug)]
pub enum CalibrateError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error("Observed and model visibilities differ in shape: {0}")]
    ShapeMismatch(String),

    #[error("Gain table has {gaintable} antennas, but the visibilities have {vis}")]
    AntennaMismatch { gaintable: usize, vis: usize },

    #[error("Gain table has {gaintable} channels, but the visibilities have {vis}")]
    ChannelMismatch { gaintable: usize, vis: usize },

    #[error("Antenna {antenna} has only {baselines} unflagged baselines (need {required}) in the time slice at {time}s, channel {channel}")]
    InsufficientData {
        time: f64,
        antenna: usize,
        channel: usize,
        baselines: usize,
        required: usize,
    },

    #[error("There are no visibilities to calibrate")]
    NoData,
}

impl CalibrateError {
    /// Fatal errors indicate that the inputs themselves are wrong, and must
    /// abort whatever is running. Other errors only spoil a single term.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CalibrateError::InsufficientData { .. } | CalibrateError::NoData
        )
    }
}
