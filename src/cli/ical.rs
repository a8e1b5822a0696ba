// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image a simulated observation with major cycles of deconvolution and
//! self-calibration.

use std::{path::PathBuf, sync::Arc, time::Instant};

use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::common::{
    peak, CalibrateArgs, DeconvolveArgs, ImagingArgs, PipelineArgs, PipelineInputs,
    PipelineSummary, SimulationArgs, ARG_FILE_HELP,
};
use crate::{
    constants::DEFAULT_NMAJOR,
    graph::{compute, LocalEngine, Plan},
    graphs::{GraphBuilder, MaybeImage, MaybeVis},
    image::InvertResult,
    primitives::CpuPrimitives,
    ImagingGraphsError,
};

/// Self-calibration starts from this major cycle by default. An empty starting
/// model has nothing to calibrate against.
const DEFAULT_FIRST_SELFCAL: usize = 1;

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct IcalCliArgs {
    /// The first major cycle in which the visibilities are self-calibrated
    /// against the current model. Default: 1
    #[clap(long, help_heading = "SELF-CALIBRATION")]
    pub(super) first_selfcal: Option<usize>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct IcalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "simulation")]
    #[serde(default)]
    pub(super) simulation_args: SimulationArgs,

    #[clap(flatten)]
    #[serde(rename = "imaging")]
    #[serde(default)]
    pub(super) imaging_args: ImagingArgs,

    #[clap(flatten)]
    #[serde(rename = "deconvolution")]
    #[serde(default)]
    pub(super) deconvolve_args: DeconvolveArgs,

    #[clap(flatten)]
    #[serde(rename = "calibration")]
    #[serde(default)]
    pub(super) calibrate_args: CalibrateArgs,

    #[clap(flatten)]
    #[serde(rename = "ical")]
    #[serde(default)]
    pub(super) ical_args: IcalCliArgs,

    #[clap(flatten)]
    #[serde(rename = "pipeline")]
    #[serde(default)]
    pub(super) pipeline_args: PipelineArgs,
}

impl IcalArgs {
    /// Consolidate the command-line arguments with those of the argument file,
    /// preferring the CLI's.
    pub(super) fn merge(self) -> Result<IcalArgs, ImagingGraphsError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let IcalArgs {
                args_file: _,
                simulation_args,
                imaging_args,
                deconvolve_args,
                calibrate_args,
                ical_args,
                pipeline_args,
            } = unpack_arg_file!(arg_file);

            Ok(IcalArgs {
                args_file: None,
                simulation_args: cli_args.simulation_args.merge(simulation_args),
                imaging_args: cli_args.imaging_args.merge(imaging_args),
                deconvolve_args: cli_args.deconvolve_args.merge(deconvolve_args),
                calibrate_args: cli_args.calibrate_args.merge(calibrate_args),
                ical_args: IcalCliArgs {
                    first_selfcal: cli_args
                        .ical_args
                        .first_selfcal
                        .or(ical_args.first_selfcal),
                },
                pipeline_args: cli_args.pipeline_args.merge(pipeline_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ImagingGraphsError> {
        debug!("{:#?}", self);

        let IcalArgs {
            args_file: _,
            simulation_args,
            imaging_args,
            deconvolve_args,
            calibrate_args,
            ical_args: IcalCliArgs { first_selfcal },
            pipeline_args,
        } = self;

        let sim_params = simulation_args.parse()?;
        let (imaging_params, weighting) = imaging_args.parse()?;
        let deconvolve_params = deconvolve_args.parse();
        let calibrate_params = calibrate_args.parse();
        let nmajor = pipeline_args.nmajor.unwrap_or(DEFAULT_NMAJOR);
        let first_selfcal = first_selfcal.unwrap_or(DEFAULT_FIRST_SELFCAL);
        let num_workers = pipeline_args.num_workers()?;

        info!(
            "Imaging context '{}' with {} facet(s) per axis and {} visibility slice(s)",
            imaging_params.context, imaging_params.facets, imaging_params.vis_slices
        );
        info!(
            "{nmajor} major cycle(s), deconvolving {:?}, self-calibrating from cycle {first_selfcal} with {} solutions",
            deconvolve_params.mode,
            if calibrate_params.global_solution { "global" } else { "per-dataset" }
        );

        let context = imaging_params.context.to_string();
        let builder = GraphBuilder::new(imaging_params, Arc::new(CpuPrimitives))?;
        let inputs = PipelineInputs::new(&sim_params, &builder, weighting)?;
        let pipeline = builder.ical(
            &inputs.vis,
            &inputs.template,
            &deconvolve_params,
            &calibrate_params,
            nmajor,
            first_selfcal,
        )?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let start = Instant::now();
        let engine = LocalEngine::new(num_workers)?;
        info!("Computing with {num_workers} worker(s)");
        let outputs = Plan::task(
            "ical",
            (pipeline.model, pipeline.residual, pipeline.psf, pipeline.vis),
            |(model, residual, psf, vis): (
                &MaybeImage,
                &InvertResult,
                &InvertResult,
                Vec<&MaybeVis>,
            )| {
                let vis_weights = vis
                    .into_iter()
                    .map(|v| v.as_ref().map(|v| v.sum_weights()).unwrap_or(0.0))
                    .collect::<Vec<_>>();
                Ok((model.clone(), residual.clone(), psf.clone(), vis_weights))
            },
        );
        let (model, (residual, residual_weights), (psf, _), vis_weights) =
            compute(&engine, &outputs)?;
        let elapsed = start.elapsed();
        info!("Pipeline complete in {:.2} s", elapsed.as_secs_f64());

        let (nchan, npol, ny, nx) = residual.shape();
        let summary = PipelineSummary {
            pipeline: "ical",
            context,
            nmajor,
            image_shape: [nchan, npol, ny, nx],
            true_flux: inputs.obs.sky.total_flux(),
            model_flux: model.as_ref().map(|m| m.total_flux()),
            psf_peak: peak(&psf),
            residual_peak: peak(&residual),
            residual_sum_weights: residual_weights.sum(),
            calibrated_sum_weights: Some(vis_weights),
            elapsed_seconds: elapsed.as_secs_f64(),
        };
        summary.write(pipeline_args.output.as_deref())
    }
}
