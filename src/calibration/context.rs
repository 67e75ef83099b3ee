// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The calibration terms that can be solved for, and how each is solved.

use std::collections::BTreeMap;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::ConfigurationError;

/// A calibration term. Each letter is a separate Jones matrix in the
/// measurement equation.
#[derive(
    Debug,
    Display,
    EnumIter,
    EnumString,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum JonesTerm {
    /// Atmospheric phase
    T,
    /// Electronic gain
    G,
    /// Polarisation leakage
    P,
    /// Bandpass
    B,
    /// Ionosphere
    I,
}

impl JonesTerm {
    pub fn letter(self) -> char {
        match self {
            JonesTerm::T => 'T',
            JonesTerm::G => 'G',
            JonesTerm::P => 'P',
            JonesTerm::B => 'B',
            JonesTerm::I => 'I',
        }
    }
}

impl TryFrom<char> for JonesTerm {
    type Error = ConfigurationError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        JonesTerm::iter()
            .find(|t| t.letter() == c)
            .ok_or(ConfigurationError::UnknownTerm(c))
    }
}

/// The degrees of freedom of a term's correction.
#[derive(
    Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JonesShape {
    /// One complex gain shared by both polarisations.
    Scalar,
    /// Independent gains for each polarisation (a diagonal Jones matrix).
    Vector,
    /// A full 2x2 Jones matrix, including leakage.
    Matrix,
}

impl JonesShape {
    pub fn parse(s: &str) -> Result<JonesShape, ConfigurationError> {
        JonesShape::from_str(s).map_err(|_| ConfigurationError::InvalidShape(s.to_string()))
    }
}

/// How long a term's solutions remain valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimesliceRepr", into = "TimesliceRepr")]
pub enum Timeslice {
    /// One solution per integration.
    Auto,
    /// \[seconds\]
    Seconds(f64),
}

impl Timeslice {
    pub fn seconds(s: f64) -> Result<Timeslice, ConfigurationError> {
        if s.is_finite() && s > 0.0 {
            Ok(Timeslice::Seconds(s))
        } else {
            Err(ConfigurationError::InvalidTimeslice(s.to_string()))
        }
    }

    pub fn validate(self) -> Result<Timeslice, ConfigurationError> {
        match self {
            Timeslice::Auto => Ok(self),
            Timeslice::Seconds(s) => Timeslice::seconds(s),
        }
    }
}

impl std::fmt::Display for Timeslice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeslice::Auto => write!(f, "auto"),
            Timeslice::Seconds(s) => write!(f, "{s}s"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TimesliceRepr {
    Name(String),
    Seconds(f64),
}

impl TryFrom<TimesliceRepr> for Timeslice {
    type Error = ConfigurationError;

    fn try_from(repr: TimesliceRepr) -> Result<Self, Self::Error> {
        match repr {
            TimesliceRepr::Name(s) if s == "auto" => Ok(Timeslice::Auto),
            TimesliceRepr::Name(s) => match s.parse::<f64>() {
                Ok(secs) => Timeslice::seconds(secs),
                Err(_) => Err(ConfigurationError::InvalidTimeslice(s)),
            },
            TimesliceRepr::Seconds(secs) => Timeslice::seconds(secs),
        }
    }
}

impl From<Timeslice> for TimesliceRepr {
    fn from(t: Timeslice) -> Self {
        match t {
            Timeslice::Auto => TimesliceRepr::Name("auto".to_string()),
            Timeslice::Seconds(s) => TimesliceRepr::Seconds(s),
        }
    }
}

/// How a single term is solved for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationContext {
    pub shape: JonesShape,
    pub timeslice: Timeslice,
    #[serde(default)]
    pub phase_only: bool,
    /// The term is only solved for from this iteration onwards.
    #[serde(default)]
    pub first_iteration: usize,
}

/// An immutable snapshot of how each calibration term is solved for. To
/// adjust a term, build a new control with [`CalibrationControl::with_context`]
/// or [`CalibrationControl::with_first_iteration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, CalibrationContext>",
    into = "BTreeMap<String, CalibrationContext>"
)]
pub struct CalibrationControl {
    contexts: IndexMap<JonesTerm, CalibrationContext>,
}

impl CalibrationControl {
    /// A control with no terms at all.
    pub fn empty() -> CalibrationControl {
        CalibrationControl {
            contexts: IndexMap::new(),
        }
    }

    pub fn get(&self, term: JonesTerm) -> Option<&CalibrationContext> {
        self.contexts.get(&term)
    }

    pub fn terms(&self) -> impl Iterator<Item = (JonesTerm, &CalibrationContext)> {
        self.contexts.iter().map(|(t, c)| (*t, c))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// A new control with `term` set to `context`.
    pub fn with_context(
        &self,
        term: JonesTerm,
        context: CalibrationContext,
    ) -> Result<CalibrationControl, ConfigurationError> {
        context.timeslice.validate()?;
        let mut contexts = self.contexts.clone();
        contexts.insert(term, context);
        Ok(CalibrationControl { contexts })
    }

    /// A new control where `term` is first solved for at `first_iteration`.
    pub fn with_first_iteration(
        &self,
        term: JonesTerm,
        first_iteration: usize,
    ) -> Result<CalibrationControl, ConfigurationError> {
        let mut context = *self
            .get(term)
            .ok_or(ConfigurationError::MissingContext(term))?;
        context.first_iteration = first_iteration;
        self.with_context(term, context)
    }

    /// Parse a calibration context string like "TGB" into its terms, checking
    /// that every term is known and present in this control.
    pub fn parse_context(&self, context: &str) -> Result<Vec<JonesTerm>, ConfigurationError> {
        Ok(self
            .resolve_context(context)?
            .into_iter()
            .map(|(term, _)| term)
            .collect())
    }

    /// As [`CalibrationControl::parse_context`], but pair each term with its
    /// context.
    pub fn resolve_context(
        &self,
        context: &str,
    ) -> Result<Vec<(JonesTerm, &CalibrationContext)>, ConfigurationError> {
        context
            .chars()
            .map(|c| {
                let term = JonesTerm::try_from(c)?;
                self.get(term)
                    .map(|term_context| (term, term_context))
                    .ok_or(ConfigurationError::MissingContext(term))
            })
            .collect()
    }
}

impl Default for CalibrationControl {
    fn default() -> Self {
        calibration_contexts()
    }
}

impl TryFrom<BTreeMap<String, CalibrationContext>> for CalibrationControl {
    type Error = ConfigurationError;

    fn try_from(map: BTreeMap<String, CalibrationContext>) -> Result<Self, Self::Error> {
        let mut contexts = IndexMap::with_capacity(map.len());
        for (key, context) in map {
            let mut chars = key.chars();
            let term = match (chars.next(), chars.next()) {
                (Some(c), None) => JonesTerm::try_from(c)?,
                _ => {
                    return Err(ConfigurationError::Invalid(format!(
                        "calibration terms are single letters, got '{key}'"
                    )))
                }
            };
            context.timeslice.validate()?;
            contexts.insert(term, context);
        }
        contexts.sort_keys();
        Ok(CalibrationControl { contexts })
    }
}

impl From<CalibrationControl> for BTreeMap<String, CalibrationContext> {
    fn from(control: CalibrationControl) -> Self {
        control
            .contexts
            .into_iter()
            .map(|(t, c)| (t.to_string(), c))
            .collect()
    }
}

/// The default way of solving for each of the known calibration terms. A new
/// value is made on every call.
pub fn calibration_contexts() -> CalibrationControl {
    let context = |shape, timeslice, phase_only| CalibrationContext {
        shape,
        timeslice,
        phase_only,
        first_iteration: 0,
    };
    let contexts = IndexMap::from([
        (
            JonesTerm::T,
            context(JonesShape::Scalar, Timeslice::Auto, true),
        ),
        (
            JonesTerm::G,
            context(JonesShape::Vector, Timeslice::Seconds(60.0), false),
        ),
        (
            JonesTerm::P,
            context(JonesShape::Matrix, Timeslice::Seconds(1e4), false),
        ),
        (
            JonesTerm::B,
            context(JonesShape::Vector, Timeslice::Seconds(1e5), false),
        ),
        (
            JonesTerm::I,
            context(JonesShape::Vector, Timeslice::Seconds(1.0), true),
        ),
    ]);
    CalibrationControl { contexts }
}
