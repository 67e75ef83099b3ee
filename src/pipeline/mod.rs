// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Imaging pipelines built on an explicit task graph.

mod error;
mod graph;
mod ical;
mod observer;
mod params;

pub use error::{ParamsError, PipelineError};
pub use graph::{Stage, TaskFn, TaskGraph, TaskId, TaskInputs, TaskLabel, Value};
pub use ical::{
    continuum_imaging_pipeline, ical_pipeline, spectral_line_imaging_pipeline, IcalOutput,
    IcalPlan,
};
pub use observer::{LogObserver, NullObserver, Observer, PipelineEvent, ProgressBarObserver};
pub use params::{ArgFileType, IcalArgs, IcalParams};
