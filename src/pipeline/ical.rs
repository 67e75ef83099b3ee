// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The ICAL pipeline: major cycles of predict, (self-)calibrate, residual, invert
and deconvolve.

The whole run is laid out as a [`TaskGraph`] up front by [`IcalPlan::build`],
which is where configuration problems are found. Nothing is computed until
[`IcalPlan::execute`]. Cycles are strictly ordered through the model: each
cycle's prediction (and so its calibration) needs the previous cycle's
deconvolved model. Partitions within a cycle are independent.
 */

use std::sync::Arc;

use super::{
    graph::{Stage, TaskGraph, TaskId, TaskLabel, Value},
    observer::{Observer, PipelineEvent, ProgressBarObserver, Tee},
    IcalParams, PipelineError,
};
use crate::{
    calibration::{calibrate, qa_gaintable, GainTables, JonesTerm},
    image::Image,
    imaging::{sum_invert_results, DeconvolutionStage, ImagingStage, Inverted},
    messages::IcalDetails,
    vis::{VisData, Visibility},
    ConfigurationError,
};

/// What the pipelines produce.
#[derive(Debug, Clone)]
pub struct IcalOutput {
    /// The final deconvolved model.
    pub model: Image,
    /// The residual image of the final model.
    pub residual: Image,
    /// The model convolved with a clean beam, plus the residual.
    pub restored: Image,
    /// The point spread function, on a grid twice the size of the model's
    /// with the same phase centre.
    pub psf: Image,
    /// For each partition, the gain tables from its most recent
    /// self-calibration. Empty if it was never calibrated.
    pub gaintables: Vec<GainTables>,
}

#[derive(Debug, Clone)]
struct Targets {
    model: TaskId,
    residual: TaskId,
    restored: TaskId,
    psf: TaskId,
    calibrations: Vec<Option<TaskId>>,
}

/// A fully-described pipeline run, ready to be executed.
pub struct IcalPlan {
    graph: TaskGraph,
    targets: Targets,
    num_cycles: usize,
    num_partitions: usize,
}

impl IcalPlan {
    /// Lay out an ICAL run of `vis_list` starting from `model`. `model` also
    /// sets the image grid.
    pub fn build(
        vis_list: Vec<Visibility>,
        model: Image,
        imaging: Arc<dyn ImagingStage>,
        deconvolver: Arc<dyn DeconvolutionStage>,
        params: &IcalParams,
    ) -> Result<IcalPlan, PipelineError> {
        IcalPlan::build_inner(vis_list, model, None, imaging, deconvolver, params)
    }

    /// As [`IcalPlan::build`], but the visibilities of `continuum_model` are
    /// subtracted from each partition before anything else is done.
    pub fn build_with_continuum(
        vis_list: Vec<Visibility>,
        model: Image,
        continuum_model: Image,
        imaging: Arc<dyn ImagingStage>,
        deconvolver: Arc<dyn DeconvolutionStage>,
        params: &IcalParams,
    ) -> Result<IcalPlan, PipelineError> {
        IcalPlan::build_inner(
            vis_list,
            model,
            Some(continuum_model),
            imaging,
            deconvolver,
            params,
        )
    }

    fn build_inner(
        vis_list: Vec<Visibility>,
        model: Image,
        continuum_model: Option<Image>,
        imaging: Arc<dyn ImagingStage>,
        deconvolver: Arc<dyn DeconvolutionStage>,
        params: &IcalParams,
    ) -> Result<IcalPlan, PipelineError> {
        if vis_list.is_empty() {
            return Err(ConfigurationError::EmptyVisList.into());
        }
        let terms = params.validate()?;
        let num_partitions = vis_list.len();
        let num_cycles = params.num_cycles();
        let mut graph = TaskGraph::new();

        let initial_model =
            graph.add_input(TaskLabel::new(Stage::Input, 0, None), Value::Image(model));
        let continuum = continuum_model
            .map(|c| graph.add_input(TaskLabel::new(Stage::Input, 0, None), Value::Image(c)));
        let mut observed = Vec::with_capacity(num_partitions);
        for (p, vis) in vis_list.into_iter().enumerate() {
            let mut id =
                graph.add_input(TaskLabel::new(Stage::Input, 0, Some(p)), Value::Vis(vis));
            if let Some(continuum) = continuum {
                let imaging = Arc::clone(&imaging);
                id = graph.add(
                    TaskLabel::new(Stage::SubtractContinuum, 0, Some(p)),
                    vec![id, continuum],
                    move |inputs, _| {
                        let vis = inputs.vis(0)?;
                        let mut continuum_vis = vis.zeroed_copy();
                        imaging.predict(&mut continuum_vis, inputs.image(1)?)?;
                        Ok(Value::Vis(vis.subtract(&continuum_vis)?))
                    },
                )?;
            }
            observed.push(id);
        }

        // The PSF only depends on the initial model's grid, so it's made once.
        // It's twice the image size so that it can be shifted to any pixel.
        let mut psf_parts = Vec::with_capacity(num_partitions);
        for (p, &vis) in observed.iter().enumerate() {
            let imaging = Arc::clone(&imaging);
            psf_parts.push(graph.add(
                TaskLabel::new(Stage::Psf, 0, Some(p)),
                vec![vis, initial_model],
                move |inputs, _| {
                    Ok(Value::Inverted(imaging.invert(
                        inputs.vis(0)?,
                        &inputs.image(1)?.psf_template(),
                        true,
                    )?))
                },
            )?);
        }
        let psf = add_combine(
            &mut graph,
            TaskLabel::new(Stage::CombinePsf, 0, None),
            psf_parts,
        )?;

        let mut model = initial_model;
        let mut baseline = observed.clone();
        let mut calibrations = vec![None; num_partitions];
        for cycle in 0..num_cycles {
            let mut inverted = Vec::with_capacity(num_partitions);
            for p in 0..num_partitions {
                let imaging_p = Arc::clone(&imaging);
                let predicted = graph.add(
                    TaskLabel::new(Stage::Predict, cycle, Some(p)),
                    vec![observed[p], model],
                    move |inputs, _| {
                        let mut predicted = inputs.vis(0)?.zeroed_copy();
                        imaging_p.predict(&mut predicted, inputs.image(1)?)?;
                        Ok(Value::Vis(predicted))
                    },
                )?;

                if params.selfcal_at(cycle) {
                    let calibrated = add_calibrate(
                        &mut graph,
                        cycle,
                        p,
                        baseline[p],
                        predicted,
                        params,
                        &terms,
                    )?;
                    // Later cycles work from the corrected data.
                    baseline[p] = calibrated;
                    calibrations[p] = Some(calibrated);
                }

                let residual = graph.add(
                    TaskLabel::new(Stage::Subtract, cycle, Some(p)),
                    vec![baseline[p], predicted],
                    |inputs, _| Ok(Value::Vis(inputs.vis(0)?.subtract(inputs.vis(1)?)?)),
                )?;

                let imaging_p = Arc::clone(&imaging);
                inverted.push(graph.add(
                    TaskLabel::new(Stage::Invert, cycle, Some(p)),
                    vec![residual, initial_model],
                    move |inputs, _| {
                        Ok(Value::Inverted(imaging_p.invert(
                            inputs.vis(0)?,
                            inputs.image(1)?,
                            false,
                        )?))
                    },
                )?);
            }

            let combined = add_combine(
                &mut graph,
                TaskLabel::new(Stage::CombineResidual, cycle, None),
                inverted,
            )?;
            let deconvolver = Arc::clone(&deconvolver);
            model = graph.add(
                TaskLabel::new(Stage::Deconvolve, cycle, None),
                vec![combined, psf, model],
                move |inputs, observer| {
                    let residual = inputs.image(0)?;
                    let updated =
                        deconvolver.deconvolve(residual, inputs.image(1)?, inputs.image(2)?)?;
                    observer.notify(&PipelineEvent::CycleFinished {
                        cycle,
                        residual_peak: residual.max_abs(),
                        model_peak: updated.max_abs(),
                    });
                    Ok(Value::Image(updated))
                },
            )?;
        }

        let mut final_parts = Vec::with_capacity(num_partitions);
        for (p, &vis) in baseline.iter().enumerate() {
            let imaging = Arc::clone(&imaging);
            final_parts.push(graph.add(
                TaskLabel::new(Stage::FinalResidual, num_cycles, Some(p)),
                vec![vis, model],
                move |inputs, _| {
                    let vis = inputs.vis(0)?;
                    let model = inputs.image(1)?;
                    let mut predicted = vis.zeroed_copy();
                    imaging.predict(&mut predicted, model)?;
                    Ok(Value::Inverted(imaging.invert(
                        &vis.subtract(&predicted)?,
                        model,
                        false,
                    )?))
                },
            )?);
        }
        let residual = add_combine(
            &mut graph,
            TaskLabel::new(Stage::CombineFinalResidual, num_cycles, None),
            final_parts,
        )?;
        let restored = graph.add(
            TaskLabel::new(Stage::Restore, num_cycles, None),
            vec![model, psf, residual],
            move |inputs, _| {
                Ok(Value::Image(imaging.restore(
                    inputs.image(0)?,
                    inputs.image(1)?,
                    inputs.image(2)?,
                )?))
            },
        )?;

        Ok(IcalPlan {
            graph,
            targets: Targets {
                model,
                residual,
                restored,
                psf,
                calibrations,
            },
            num_cycles,
            num_partitions,
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn num_cycles(&self) -> usize {
        self.num_cycles
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Run the plan.
    pub fn execute(&self, observer: &dyn Observer) -> Result<IcalOutput, PipelineError> {
        observer.notify(&PipelineEvent::PlanBuilt {
            num_tasks: self.graph.len(),
            num_cycles: self.num_cycles,
            num_partitions: self.num_partitions,
        });

        let t = &self.targets;
        let mut targets = vec![t.model, t.residual, t.restored, t.psf];
        targets.extend(t.calibrations.iter().flatten());
        let values = self.graph.execute(&targets, observer)?;

        let image_of = |i: usize| -> Result<Image, PipelineError> {
            values[i]
                .image()
                .cloned()
                .ok_or_else(|| self.unexpected(targets[i], "an image"))
        };
        let model = image_of(0)?;
        let residual = image_of(1)?;
        let restored = image_of(2)?;
        let psf = image_of(3)?;

        let mut calibrated = targets[4..].iter().zip(values[4..].iter());
        let gaintables = t
            .calibrations
            .iter()
            .map(|c| match (c, calibrated.next()) {
                (None, _) => Ok(GainTables::new()),
                (Some(_), Some((&id, v))) => v
                    .gaintables()
                    .cloned()
                    .ok_or_else(|| self.unexpected(id, "gain tables")),
                (Some(_), None) => Err(PipelineError::MissingValue("gain tables".to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IcalOutput {
            model,
            residual,
            restored,
            psf,
            gaintables,
        })
    }

    fn unexpected(&self, id: TaskId, expected: &'static str) -> PipelineError {
        PipelineError::UnexpectedValue {
            task: self
                .graph
                .label(id)
                .map(|l| l.to_string())
                .unwrap_or_default(),
            expected,
        }
    }
}

fn add_combine(
    graph: &mut TaskGraph,
    label: TaskLabel,
    parts: Vec<TaskId>,
) -> Result<TaskId, PipelineError> {
    graph.add(label, parts, |inputs, _| {
        let parts = (0..inputs.len())
            .map(|i| inputs.inverted(i).cloned())
            .collect::<Result<Vec<Inverted>, _>>()?;
        Ok(Value::Inverted(sum_invert_results(&parts)?))
    })
}

fn add_calibrate(
    graph: &mut TaskGraph,
    cycle: usize,
    partition: usize,
    observed: TaskId,
    predicted: TaskId,
    params: &IcalParams,
    terms: &[JonesTerm],
) -> Result<TaskId, PipelineError> {
    let context = params.calibration_context.clone();
    let control = params.control.clone();
    let solver = params.solver;
    let terms = terms.to_vec();
    graph.add(
        TaskLabel::new(Stage::Calibrate, cycle, Some(partition)),
        vec![observed, predicted],
        move |inputs, observer| {
            let vis = VisData::Flat(inputs.vis(0)?.clone());
            let model = VisData::Block(inputs.vis(1)?.to_block()?);
            // The major cycle is the calibration iteration.
            let (corrected, gaintables) =
                calibrate(vis, &model, &context, &control, cycle, &solver)?;
            for &term in &terms {
                let event = match (gaintables.get(&term), control.get(term)) {
                    (Some(gt), _) => PipelineEvent::TermSolved {
                        cycle,
                        partition,
                        term,
                        qa: qa_gaintable(gt),
                    },
                    (None, Some(c)) if cycle < c.first_iteration => PipelineEvent::TermSkipped {
                        cycle,
                        partition,
                        term,
                        first_iteration: c.first_iteration,
                    },
                    (None, _) => PipelineEvent::TermOmitted {
                        cycle,
                        partition,
                        term,
                    },
                };
                observer.notify(&event);
            }
            Ok(Value::Calibrated {
                vis: corrected.into_flat(),
                gaintables,
            })
        },
    )
}

fn print_details(
    pipeline: &'static str,
    vis_list: &[Visibility],
    model: &Image,
    params: &IcalParams,
) {
    IcalDetails {
        pipeline,
        vis_list,
        model,
        num_cycles: params.num_cycles(),
        first_selfcal: params.first_selfcal,
        calibration_context: &params.calibration_context,
        control: &params.control,
    }
    .print();
}

fn run_plan(
    plan: &IcalPlan,
    params: &IcalParams,
    observer: &dyn Observer,
) -> Result<IcalOutput, PipelineError> {
    let progress = ProgressBarObserver::new(plan.graph().len(), params.progress_bars);
    let output = plan.execute(&Tee(observer, &progress))?;
    progress.finish();
    Ok(output)
}

/// Run ICAL: image `vis_list` with `nmajor` major cycles, self-calibrating
/// from cycle `first_selfcal` onwards.
pub fn ical_pipeline(
    vis_list: Vec<Visibility>,
    model: Image,
    imaging: Arc<dyn ImagingStage>,
    deconvolver: Arc<dyn DeconvolutionStage>,
    params: &IcalParams,
    observer: &dyn Observer,
) -> Result<IcalOutput, PipelineError> {
    params.validate()?;
    print_details("ICAL", &vis_list, &model, params);
    let plan = IcalPlan::build(vis_list, model, imaging, deconvolver, params)?;
    run_plan(&plan, params, observer)
}

/// ICAL without any self-calibration.
pub fn continuum_imaging_pipeline(
    vis_list: Vec<Visibility>,
    model: Image,
    imaging: Arc<dyn ImagingStage>,
    deconvolver: Arc<dyn DeconvolutionStage>,
    params: &IcalParams,
    observer: &dyn Observer,
) -> Result<IcalOutput, PipelineError> {
    let params = IcalParams {
        first_selfcal: None,
        ..params.clone()
    };
    params.validate()?;
    print_details("Continuum imaging", &vis_list, &model, &params);
    let plan = IcalPlan::build(vis_list, model, imaging, deconvolver, &params)?;
    run_plan(&plan, &params, observer)
}

/// Continuum imaging of whatever remains after the visibilities of
/// `continuum_model` (if any) are subtracted.
#[allow(clippy::too_many_arguments)]
pub fn spectral_line_imaging_pipeline(
    vis_list: Vec<Visibility>,
    model: Image,
    continuum_model: Option<Image>,
    imaging: Arc<dyn ImagingStage>,
    deconvolver: Arc<dyn DeconvolutionStage>,
    params: &IcalParams,
    observer: &dyn Observer,
) -> Result<IcalOutput, PipelineError> {
    let params = IcalParams {
        first_selfcal: None,
        ..params.clone()
    };
    params.validate()?;
    print_details("Spectral-line imaging", &vis_list, &model, &params);
    let plan = match continuum_model {
        Some(continuum) => IcalPlan::build_with_continuum(
            vis_list,
            model,
            continuum,
            imaging,
            deconvolver,
            &params,
        )?,
        None => IcalPlan::build(vis_list, model, imaging, deconvolver, &params)?,
    };
    run_plan(&plan, &params, observer)
}
