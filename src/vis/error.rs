// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with visibility containers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("Visibility sample (time {time}s, antennas {antenna1}-{antenna2}, channel {channel}) appears more than once")]
    DuplicateSample {
        time: f64,
        antenna1: usize,
        antenna2: usize,
        channel: usize,
    },

    #[error("Antenna {antenna} is out of range; there are only {num_antennas} antennas")]
    AntennaOutOfRange { antenna: usize, num_antennas: usize },

    #[error("Channel {channel} has inconsistent frequencies ({first} Hz vs. {other} Hz)")]
    InconsistentFrequency {
        channel: usize,
        first: f64,
        other: f64,
    },

    #[error("Channel {0} has no samples; channels must be contiguous from 0")]
    MissingChannel(usize),

    #[error("Time {0}s has inconsistent integration times across its samples")]
    InconsistentIntegrationTime(f64),

    #[error("Baseline {antenna1}-{antenna2} at time {time}s has inconsistent UVWs across channels")]
    InconsistentUvw {
        time: f64,
        antenna1: usize,
        antenna2: usize,
    },

    #[error("Visibility sets do not share the same sample layout: {0}")]
    LayoutMismatch(String),
}
