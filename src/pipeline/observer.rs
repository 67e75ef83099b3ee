// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Structured pipeline events, and the things that consume them.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace, warn};

use super::graph::TaskLabel;
use crate::calibration::{GainTableQa, JonesTerm};

/// Something that happened while a pipeline ran.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PlanBuilt {
        num_tasks: usize,
        num_cycles: usize,
        num_partitions: usize,
    },

    StageStarted {
        label: TaskLabel,
    },

    StageFinished {
        label: TaskLabel,
        elapsed: Duration,
    },

    StageFailed {
        label: TaskLabel,
        error: String,
    },

    /// A calibration term wasn't solved for because its first iteration hasn't
    /// been reached.
    TermSkipped {
        cycle: usize,
        partition: usize,
        term: JonesTerm,
        first_iteration: usize,
    },

    TermSolved {
        cycle: usize,
        partition: usize,
        term: JonesTerm,
        qa: GainTableQa,
    },

    /// A calibration term was attempted, but its solve failed and no
    /// correction was applied.
    TermOmitted {
        cycle: usize,
        partition: usize,
        term: JonesTerm,
    },

    CycleFinished {
        cycle: usize,
        /// The largest absolute value of the residual image that was
        /// deconvolved.
        residual_peak: f64,
        /// The largest absolute value of the updated model.
        model_peak: f64,
    },
}

/// Receives [`PipelineEvent`]s. Events may arrive from any thread.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &PipelineEvent);
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _: &PipelineEvent) {}
}

/// Renders events as log messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PlanBuilt {
                num_tasks,
                num_cycles,
                num_partitions,
            } => debug!(
                "Pipeline has {num_tasks} tasks over {num_cycles} cycles and {num_partitions} partitions"
            ),
            PipelineEvent::StageStarted { label } => trace!("Starting {label}"),
            PipelineEvent::StageFinished { label, elapsed } => {
                debug!("Finished {label} in {:.3}s", elapsed.as_secs_f64())
            }
            PipelineEvent::StageFailed { label, error } => warn!("{label} failed: {error}"),
            PipelineEvent::TermSkipped {
                cycle,
                partition,
                term,
                first_iteration,
            } => debug!(
                "Cycle {cycle}, partition {partition}: skipping term {term} until iteration {first_iteration}"
            ),
            PipelineEvent::TermSolved {
                cycle,
                partition,
                term,
                qa,
            } => debug!("Cycle {cycle}, partition {partition}: term {term}: {qa}"),
            PipelineEvent::TermOmitted {
                cycle,
                partition,
                term,
            } => warn!("Cycle {cycle}, partition {partition}: no correction for term {term}"),
            PipelineEvent::CycleFinished {
                cycle,
                residual_peak,
                model_peak,
            } => info!(
                "Major cycle {cycle} done; residual peak {residual_peak:.4e}, model peak {model_peak:.4e}"
            ),
        }
    }
}

/// Ticks a progress bar for every finished task. The bar is hidden unless
/// enabled.
pub struct ProgressBarObserver {
    progress: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new(num_tasks: usize, enabled: bool) -> ProgressBarObserver {
        let progress = ProgressBar::with_draw_target(
            Some(num_tasks as u64),
            if enabled {
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg:30}: [{wide_bar:.blue}] {pos:3}/{len:3} tasks ({elapsed_precise}<{eta_precise})")
        {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message("ICAL");
        ProgressBarObserver { progress }
    }

    pub fn position(&self) -> u64 {
        self.progress.position()
    }

    pub fn finish(&self) {
        self.progress.finish_with_message("ICAL done");
    }
}

impl Observer for ProgressBarObserver {
    fn notify(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageFinished { label, .. } => {
                self.progress.set_message(label.to_string());
                self.progress.inc(1);
            }
            PipelineEvent::StageFailed { label, .. } => {
                self.progress.abandon_with_message(format!("{label} failed"));
            }
            _ => (),
        }
    }
}

/// Passes every event on to two observers.
pub(crate) struct Tee<'a>(pub(crate) &'a dyn Observer, pub(crate) &'a dyn Observer);

impl Observer for Tee<'_> {
    fn notify(&self, event: &PipelineEvent) {
        self.0.notify(event);
        self.1.notify(event);
    }
}
