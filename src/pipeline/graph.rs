// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
An explicit task graph.

Pipelines are first described as a graph of tasks (stage invocations with
their data dependencies) and only run when [`TaskGraph::execute`] is called. A
task can only depend on tasks added before it, so every graph is acyclic.
Tasks without a path between them run in parallel.
 */

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rayon::prelude::*;
use strum_macros::{Display, EnumIter};

use super::{
    observer::{Observer, PipelineEvent},
    PipelineError,
};
use crate::{calibration::GainTables, image::Image, imaging::Inverted, vis::Visibility};

/// The kinds of work a pipeline does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Input,
    SubtractContinuum,
    Psf,
    CombinePsf,
    Predict,
    Calibrate,
    Subtract,
    Invert,
    CombineResidual,
    Deconvolve,
    FinalResidual,
    CombineFinalResidual,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskLabel {
    pub stage: Stage,
    pub cycle: usize,
    /// The index into the visibility list, for tasks that only work on one
    /// entry.
    pub partition: Option<usize>,
}

impl TaskLabel {
    pub fn new(stage: Stage, cycle: usize, partition: Option<usize>) -> TaskLabel {
        TaskLabel {
            stage,
            cycle,
            partition,
        }
    }
}

impl std::fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.partition {
            Some(p) => write!(f, "{} (cycle {}, partition {p})", self.stage, self.cycle),
            None => write!(f, "{} (cycle {})", self.stage, self.cycle),
        }
    }
}

/// The output of a task.
#[derive(Debug, Clone)]
pub enum Value {
    Vis(Visibility),
    Calibrated {
        vis: Visibility,
        gaintables: GainTables,
    },
    Inverted(Inverted),
    Image(Image),
}

impl Value {
    /// Visibilities, including calibrated ones.
    pub fn vis(&self) -> Option<&Visibility> {
        match self {
            Value::Vis(vis) | Value::Calibrated { vis, .. } => Some(vis),
            _ => None,
        }
    }

    pub fn gaintables(&self) -> Option<&GainTables> {
        match self {
            Value::Calibrated { gaintables, .. } => Some(gaintables),
            _ => None,
        }
    }

    pub fn inverted(&self) -> Option<&Inverted> {
        match self {
            Value::Inverted(i) => Some(i),
            _ => None,
        }
    }

    /// An image, including the image of an inversion.
    pub fn image(&self) -> Option<&Image> {
        match self {
            Value::Image(i) | Value::Inverted(Inverted { image: i, .. }) => Some(i),
            _ => None,
        }
    }
}

/// The inputs to a task, in the order of its dependencies.
pub struct TaskInputs<'a> {
    pub label: TaskLabel,
    values: &'a [Arc<Value>],
}

impl<'a> TaskInputs<'a> {
    fn get(&self, i: usize) -> Result<&'a Value, PipelineError> {
        self.values
            .get(i)
            .map(|v| v.as_ref())
            .ok_or_else(|| PipelineError::MissingValue(format!("input {i} of {}", self.label)))
    }

    fn unexpected(&self, expected: &'static str) -> PipelineError {
        PipelineError::UnexpectedValue {
            task: self.label.to_string(),
            expected,
        }
    }

    pub fn vis(&self, i: usize) -> Result<&'a Visibility, PipelineError> {
        self.get(i)?.vis().ok_or_else(|| self.unexpected("visibilities"))
    }

    pub fn image(&self, i: usize) -> Result<&'a Image, PipelineError> {
        self.get(i)?.image().ok_or_else(|| self.unexpected("an image"))
    }

    pub fn inverted(&self, i: usize) -> Result<&'a Inverted, PipelineError> {
        self.get(i)?
            .inverted()
            .ok_or_else(|| self.unexpected("an inverted image"))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type TaskFn =
    Box<dyn Fn(&TaskInputs, &dyn Observer) -> Result<Value, PipelineError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

pub struct Task {
    pub label: TaskLabel,
    pub deps: Vec<TaskId>,
    func: TaskFn,
}

#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new() -> TaskGraph {
        TaskGraph::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn check(&self, id: TaskId) -> Result<(), PipelineError> {
        if id.0 < self.tasks.len() {
            Ok(())
        } else {
            Err(PipelineError::UnknownTask {
                id: id.0,
                len: self.tasks.len(),
            })
        }
    }

    /// Add a task that runs `func` on the outputs of `deps`.
    pub fn add<F>(
        &mut self,
        label: TaskLabel,
        deps: Vec<TaskId>,
        func: F,
    ) -> Result<TaskId, PipelineError>
    where
        F: Fn(&TaskInputs, &dyn Observer) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        for &dep in &deps {
            self.check(dep)?;
        }
        self.tasks.push(Task {
            label,
            deps,
            func: Box::new(func),
        });
        Ok(TaskId(self.tasks.len() - 1))
    }

    /// Add a task with no dependencies that always produces `value`.
    pub fn add_input(&mut self, label: TaskLabel, value: Value) -> TaskId {
        self.tasks.push(Task {
            label,
            deps: vec![],
            func: Box::new(
                move |_: &TaskInputs, _: &dyn Observer| -> Result<Value, PipelineError> {
                    Ok(value.clone())
                },
            ),
        });
        TaskId(self.tasks.len() - 1)
    }

    pub fn label(&self, id: TaskId) -> Option<TaskLabel> {
        self.tasks.get(id.0).map(|t| t.label)
    }

    pub fn labels(&self) -> impl Iterator<Item = (TaskId, TaskLabel)> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (TaskId(i), t.label))
    }

    pub fn dependencies(&self, id: TaskId) -> &[TaskId] {
        self.tasks
            .get(id.0)
            .map(|t| t.deps.as_slice())
            .unwrap_or(&[])
    }

    /// All tasks of a stage in a cycle, in partition order.
    pub fn find(&self, stage: Stage, cycle: usize) -> Vec<TaskId> {
        self.labels()
            .filter(|(_, l)| l.stage == stage && l.cycle == cycle)
            .map(|(id, _)| id)
            .collect()
    }

    /// All tasks of a stage.
    pub fn find_stage(&self, stage: Stage) -> Vec<TaskId> {
        self.labels()
            .filter(|(_, l)| l.stage == stage)
            .map(|(id, _)| id)
            .collect()
    }

    /// Does `a` need the output of `b`, directly or indirectly?
    pub fn depends_on(&self, a: TaskId, b: TaskId) -> bool {
        if b >= a || a.0 >= self.tasks.len() {
            return false;
        }
        self.ancestors(&[a])[b.0]
    }

    /// Which tasks are needed to produce `targets`, targets included.
    fn ancestors(&self, targets: &[TaskId]) -> Vec<bool> {
        let mut needed = vec![false; self.tasks.len()];
        let mut stack = targets.to_vec();
        while let Some(id) = stack.pop() {
            if needed[id.0] {
                continue;
            }
            needed[id.0] = true;
            stack.extend(self.tasks[id.0].deps.iter().copied());
        }
        needed
    }

    /// Run everything needed to produce `targets`, and return their outputs
    /// in the same order. Tasks are grouped into wavefronts; every task in a
    /// wavefront only depends on earlier wavefronts, and a wavefront's tasks
    /// are run in parallel. An output is dropped as soon as everything that
    /// needs it has run. The first error stops execution.
    pub fn execute(
        &self,
        targets: &[TaskId],
        observer: &dyn Observer,
    ) -> Result<Vec<Arc<Value>>, PipelineError> {
        for &t in targets {
            self.check(t)?;
        }
        let n = self.tasks.len();
        let needed = self.ancestors(targets);

        let mut wavefront = vec![0; n];
        let mut consumers = vec![0usize; n];
        for (i, task) in self.tasks.iter().enumerate().filter(|(i, _)| needed[*i]) {
            wavefront[i] = task
                .deps
                .iter()
                .map(|d| wavefront[d.0] + 1)
                .max()
                .unwrap_or(0);
            for d in &task.deps {
                consumers[d.0] += 1;
            }
        }
        for t in targets {
            consumers[t.0] += 1;
        }
        let num_wavefronts = (0..n)
            .filter(|&i| needed[i])
            .map(|i| wavefront[i] + 1)
            .max()
            .unwrap_or(0);

        let mut results: Vec<Option<Arc<Value>>> = vec![None; n];
        for w in 0..num_wavefronts {
            let ids = (0..n)
                .filter(|&i| needed[i] && wavefront[i] == w)
                .collect::<Vec<_>>();
            let inputs = ids
                .iter()
                .map(|&i| {
                    self.tasks[i]
                        .deps
                        .iter()
                        .map(|d| {
                            results[d.0].clone().ok_or_else(|| {
                                PipelineError::MissingValue(self.tasks[d.0].label.to_string())
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;

            for &i in &ids {
                observer.notify(&PipelineEvent::StageStarted {
                    label: self.tasks[i].label,
                });
            }
            let outcomes: Vec<(usize, Result<Value, PipelineError>, Duration)> = ids
                .par_iter()
                .zip(inputs.par_iter())
                .map(|(&i, values)| {
                    let task = &self.tasks[i];
                    let inputs = TaskInputs {
                        label: task.label,
                        values,
                    };
                    let start = Instant::now();
                    let result = (task.func)(&inputs, observer);
                    (i, result, start.elapsed())
                })
                .collect();
            drop(inputs);

            for (i, result, elapsed) in outcomes {
                let label = self.tasks[i].label;
                match result {
                    Ok(value) => {
                        observer.notify(&PipelineEvent::StageFinished { label, elapsed });
                        results[i] = Some(Arc::new(value));
                    }
                    Err(e) => {
                        observer.notify(&PipelineEvent::StageFailed {
                            label,
                            error: e.to_string(),
                        });
                        return Err(e);
                    }
                }
            }

            for &i in &ids {
                for d in &self.tasks[i].deps {
                    consumers[d.0] -= 1;
                    if consumers[d.0] == 0 {
                        results[d.0] = None;
                    }
                }
            }
        }

        targets
            .iter()
            .map(|t| {
                results[t.0]
                    .clone()
                    .ok_or_else(|| PipelineError::MissingValue(self.tasks[t.0].label.to_string()))
            })
            .collect()
    }
}
