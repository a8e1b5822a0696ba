// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image a simulated observation with major cycles of deconvolution.

use std::{path::PathBuf, sync::Arc, time::Instant};

use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::common::{
    peak, DeconvolveArgs, ImagingArgs, PipelineArgs, PipelineInputs, PipelineSummary,
    SimulationArgs, ARG_FILE_HELP,
};
use crate::{
    constants::DEFAULT_NMAJOR,
    graph::{compute, LocalEngine, Plan},
    graphs::{GraphBuilder, MaybeImage},
    image::InvertResult,
    primitives::CpuPrimitives,
    ImagingGraphsError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ContinuumImagingArgs {
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
    #[serde(rename = "pipeline")]
    #[serde(default)]
    pub(super) pipeline_args: PipelineArgs,
}

impl ContinuumImagingArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<ContinuumImagingArgs, ImagingGraphsError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let ContinuumImagingArgs {
                args_file: _,
                simulation_args,
                imaging_args,
                deconvolve_args,
                pipeline_args,
            } = unpack_arg_file!(arg_file);

            Ok(ContinuumImagingArgs {
                args_file: None,
                simulation_args: cli_args.simulation_args.merge(simulation_args),
                imaging_args: cli_args.imaging_args.merge(imaging_args),
                deconvolve_args: cli_args.deconvolve_args.merge(deconvolve_args),
                pipeline_args: cli_args.pipeline_args.merge(pipeline_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), ImagingGraphsError> {
        debug!("{:#?}", self);

        let ContinuumImagingArgs {
            args_file: _,
            simulation_args,
            imaging_args,
            deconvolve_args,
            pipeline_args,
        } = self;

        let sim_params = simulation_args.parse()?;
        let (imaging_params, weighting) = imaging_args.parse()?;
        let deconvolve_params = deconvolve_args.parse();
        let nmajor = pipeline_args.nmajor.unwrap_or(DEFAULT_NMAJOR);
        let num_workers = pipeline_args.num_workers()?;

        info!(
            "Imaging context '{}' with {} facet(s) per axis and {} visibility slice(s)",
            imaging_params.context, imaging_params.facets, imaging_params.vis_slices
        );
        info!("{nmajor} major cycle(s), deconvolving {:?}", deconvolve_params.mode);

        let context = imaging_params.context.to_string();
        let builder = GraphBuilder::new(imaging_params, Arc::new(CpuPrimitives))?;
        let inputs = PipelineInputs::new(&sim_params, &builder, weighting)?;
        let pipeline =
            builder.continuum_imaging(&inputs.vis, &inputs.template, &deconvolve_params, nmajor)?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let start = Instant::now();
        let engine = LocalEngine::new(num_workers)?;
        info!("Computing with {num_workers} worker(s)");
        let outputs = Plan::task(
            "continuum_imaging",
            (pipeline.model, pipeline.residual, pipeline.psf),
            |(model, residual, psf): (&MaybeImage, &InvertResult, &InvertResult)| {
                Ok((model.clone(), residual.clone(), psf.clone()))
            },
        );
        let (model, (residual, residual_weights), (psf, _)) = compute(&engine, &outputs)?;
        let elapsed = start.elapsed();
        info!("Pipeline complete in {:.2} s", elapsed.as_secs_f64());

        let (nchan, npol, ny, nx) = residual.shape();
        let summary = PipelineSummary {
            pipeline: "continuum-imaging",
            context,
            nmajor,
            image_shape: [nchan, npol, ny, nx],
            true_flux: inputs.obs.sky.total_flux(),
            model_flux: model.as_ref().map(|m| m.total_flux()),
            psf_peak: peak(&psf),
            residual_peak: peak(&residual),
            residual_sum_weights: residual_weights.sum(),
            calibrated_sum_weights: None,
            elapsed_seconds: elapsed.as_secs_f64(),
        };
        summary.write(pipeline_args.output.as_deref())
    }
}
