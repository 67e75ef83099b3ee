// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for the imaging pipelines, and reading them from argument files.

use std::{path::Path, str::FromStr};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::ParamsError;
use crate::{
    calibration::{CalibrationControl, JonesTerm, SolverSettings},
    constants::{DEFAULT_CALIBRATION_CONTEXT, DEFAULT_NMAJOR},
    imaging::{CleanParams, DftImagingParams},
    ConfigurationError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcalParams {
    /// The number of major cycles. Zero and one both mean a single pass.
    pub nmajor: usize,

    /// The first major cycle that self-calibrates. `None` never calibrates.
    pub first_selfcal: Option<usize>,

    /// The calibration terms to solve for, in order, e.g. "TG".
    pub calibration_context: String,

    pub control: CalibrationControl,

    pub solver: SolverSettings,

    pub progress_bars: bool,
}

impl Default for IcalParams {
    fn default() -> Self {
        IcalParams {
            nmajor: DEFAULT_NMAJOR,
            first_selfcal: None,
            calibration_context: DEFAULT_CALIBRATION_CONTEXT.to_string(),
            control: CalibrationControl::default(),
            solver: SolverSettings::default(),
            progress_bars: false,
        }
    }
}

impl IcalParams {
    /// Check that the calibration context can be solved for with the
    /// control, returning its terms.
    pub fn validate(&self) -> Result<Vec<JonesTerm>, ConfigurationError> {
        self.control.parse_context(&self.calibration_context)
    }

    pub fn num_cycles(&self) -> usize {
        self.nmajor.max(1)
    }

    /// Does major cycle `cycle` self-calibrate?
    pub fn selfcal_at(&self, cycle: usize) -> bool {
        matches!(self.first_selfcal, Some(first) if cycle >= first)
    }
}

/// Everything needed to run a pipeline with the provided imager and
/// deconvolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcalArgs {
    pub ical: IcalParams,
    pub clean: CleanParams,
    pub imaging: DftImagingParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum ArgFileType {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

impl ArgFileType {
    fn from_path(path: &Path) -> Option<ArgFileType> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileType::from_str(&e).ok())
    }
}

impl IcalArgs {
    /// Read arguments from a toml or json file, chosen by its extension.
    pub fn from_file(path: &Path) -> Result<IcalArgs, ParamsError> {
        debug!("Attempting to parse argument file {}", path.display());
        let file_type = ArgFileType::from_path(path).ok_or_else(|| {
            ParamsError::ArgFile(format!(
                "Argument file '{}' doesn't have a recognised file extension! Valid extensions are: {}",
                path.display(),
                ArgFileType::iter().join(", ")
            ))
        })?;
        let contents = std::fs::read_to_string(path)?;
        IcalArgs::parse(&contents, file_type).map_err(|e| match e {
            ParamsError::ArgFile(msg) => {
                ParamsError::ArgFile(format!("{msg} (from {})", path.display()))
            }
            e => e,
        })
    }

    pub fn parse(contents: &str, file_type: ArgFileType) -> Result<IcalArgs, ParamsError> {
        let args: IcalArgs = match file_type {
            ArgFileType::Toml => {
                debug!("Parsing toml...");
                toml::from_str(contents).map_err(|err| {
                    ParamsError::ArgFile(format!("Couldn't decode toml structure:\n{err}"))
                })?
            }
            ArgFileType::Json => {
                debug!("Parsing json...");
                serde_json::from_str(contents).map_err(|err| {
                    ParamsError::ArgFile(format!("Couldn't decode json structure:\n{err}"))
                })?
            }
        };
        args.ical.validate()?;
        Ok(args)
    }
}
