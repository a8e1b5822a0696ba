// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. Both pipelines simulate an
//! observation and image it, so the simulation, imaging and deconvolution
//! arguments are shared between them.


use std::{path::Path, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use super::ImagingGraphsError;
use crate::{
    constants::*,
    context::{ContextError, ImagingContext, IMAGING_CONTEXTS_COMMA_SEPARATED},
    graph::Plan,
    graphs::{GraphBuilder, MaybeBlockVis, MaybeImage, MaybeVis},
    image::{Image, ImagePolarisation},
    params::{
        CalibrateParams, DeconvolveMode, DeconvolveParams, ImagingParams, PointSource,
        SimulationParams, Weighting, WEIGHTINGS_COMMA_SEPARATED,
    },
    simulate::{simulate_observation, SimulatedObservation},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref POLARISATIONS_COMMA_SEPARATED: String = ImagePolarisation::iter().join(", ");

    static ref CONTEXT_HELP: String =
        format!("How invert and predict are decomposed. Contexts with facets need --facets; contexts with slices need --vis-slices. Supported contexts: {}. Default: {DEFAULT_CONTEXT}", *IMAGING_CONTEXTS_COMMA_SEPARATED);

    static ref POLARISATION_HELP: String =
        format!("The polarisation planes of the image. Supported values: {}. Default: {}", *POLARISATIONS_COMMA_SEPARATED, ImagePolarisation::StokesI);

    static ref WEIGHTING_HELP: String =
        format!("How the imaging weights of the visibilities are set before imaging. Supported values: {}. Default: {}", *WEIGHTINGS_COMMA_SEPARATED, Weighting::default());

    static ref NITER_HELP: String =
        format!("The maximum number of CLEAN iterations per image plane. Default: {DEFAULT_CLEAN_NITER}");

    static ref CLEAN_GAIN_HELP: String =
        format!("The fraction of the peak removed in each CLEAN iteration. Default: {DEFAULT_CLEAN_GAIN}");

    static ref FRACTIONAL_THRESHOLD_HELP: String =
        format!("Stop cleaning a plane once its peak is below this fraction of its initial peak. Default: {DEFAULT_CLEAN_FRACTIONAL_THRESHOLD}");

    static ref MAX_ITERATIONS_HELP: String =
        format!("The maximum number of iterations allowed for each gain solution. Default: {DEFAULT_MAX_ITERATIONS}");

    static ref STOP_THRESHOLD_HELP: String =
        format!("The threshold at which a gain solution is considered converged. Default: {DEFAULT_STOP_THRESHOLD:e}");

    static ref MIN_THRESHOLD_HELP: String =
        format!("The minimum threshold to satisfy convergence of a gain solution. Default: {DEFAULT_MIN_THRESHOLD:e}");

    pub(super) static ref NMAJOR_HELP: String =
        format!("The number of major cycles. Default: {DEFAULT_NMAJOR}");
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ImagingGraphsError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ImagingGraphsError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(ImagingGraphsError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

#[derive(Error, Debug)]
pub(super) enum ArgsError {
    #[error("Unrecognised image polarisation '{got}'. Supported values: {}", *POLARISATIONS_COMMA_SEPARATED)]
    UnknownPolarisation { got: String },

    #[error("Unrecognised weighting '{got}'. Supported values: {}", *WEIGHTINGS_COMMA_SEPARATED)]
    UnknownWeighting { got: String },

    #[error("Couldn't parse point source '{0}'; expected X,Y,FLUX_DENSITY (pixel offsets from the image centre and Jy)")]
    BadPointSource(String),

    #[error("At least one worker thread is needed")]
    ZeroWorkers,

    #[error(transparent)]
    Context(#[from] ContextError),
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulationArgs {
    /// The number of visibility datasets to simulate. Each covers its own
    /// block of channels.
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) num_datasets: Option<usize>,

    #[clap(long, help_heading = "SIMULATION")]
    pub(super) num_antennas: Option<usize>,

    /// The radius of the outermost antenna from the array centre [metres].
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) array_radius: Option<f64>,

    #[clap(long, help_heading = "SIMULATION")]
    pub(super) num_times: Option<usize>,

    /// [seconds]
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) integration_time: Option<f64>,

    #[clap(long, help_heading = "SIMULATION")]
    pub(super) num_chans_per_dataset: Option<usize>,

    /// The frequency of the first channel [MHz].
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) freq_start: Option<f64>,

    /// The channel width [MHz].
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) freq_res: Option<f64>,

    /// The phase centre right ascension [degrees].
    #[clap(short, long, help_heading = "SIMULATION")]
    pub(super) ra: Option<f64>,

    /// The phase centre declination [degrees].
    #[clap(short, long, allow_hyphen_values = true, help_heading = "SIMULATION")]
    pub(super) dec: Option<f64>,

    /// The number of pixels along each image axis.
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) npixel: Option<usize>,

    /// The angular size of a pixel [radians].
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) cellsize: Option<f64>,

    /// The number of image channels; either 1, or the total number of
    /// simulated channels.
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) image_nchan: Option<usize>,

    #[clap(long, help = POLARISATION_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) polarisation: Option<String>,

    /// The largest fractional error of the simulated antenna gain amplitudes.
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) gain_amplitude_error: Option<f64>,

    /// The largest error of the simulated antenna gain phases [radians].
    #[clap(long, help_heading = "SIMULATION")]
    pub(super) gain_phase_error: Option<f64>,

    /// Point sources of the true sky, each as X,Y,FLUX_DENSITY (pixel offsets
    /// from the image centre and Jy). The default is two sources.
    #[clap(
        long,
        multiple_values(true),
        allow_hyphen_values = true,
        help_heading = "SIMULATION"
    )]
    pub(super) point_sources: Option<Vec<String>>,
}

impl SimulationArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        SimulationArgs {
            num_datasets: self.num_datasets.or(other.num_datasets),
            num_antennas: self.num_antennas.or(other.num_antennas),
            array_radius: self.array_radius.or(other.array_radius),
            num_times: self.num_times.or(other.num_times),
            integration_time: self.integration_time.or(other.integration_time),
            num_chans_per_dataset: self.num_chans_per_dataset.or(other.num_chans_per_dataset),
            freq_start: self.freq_start.or(other.freq_start),
            freq_res: self.freq_res.or(other.freq_res),
            ra: self.ra.or(other.ra),
            dec: self.dec.or(other.dec),
            npixel: self.npixel.or(other.npixel),
            cellsize: self.cellsize.or(other.cellsize),
            image_nchan: self.image_nchan.or(other.image_nchan),
            polarisation: self.polarisation.or(other.polarisation),
            gain_amplitude_error: self.gain_amplitude_error.or(other.gain_amplitude_error),
            gain_phase_error: self.gain_phase_error.or(other.gain_phase_error),
            point_sources: self.point_sources.or(other.point_sources),
        }
    }

    pub(super) fn parse(self) -> Result<SimulationParams, ArgsError> {
        let SimulationArgs {
            num_datasets,
            num_antennas,
            array_radius,
            num_times,
            integration_time,
            num_chans_per_dataset,
            freq_start,
            freq_res,
            ra,
            dec,
            npixel,
            cellsize,
            image_nchan,
            polarisation,
            gain_amplitude_error,
            gain_phase_error,
            point_sources,
        } = self;

        let d = SimulationParams::default();
        let polarisation = match polarisation {
            Some(p) => ImagePolarisation::from_str(&p)
                .map_err(|_| ArgsError::UnknownPolarisation { got: p })?,
            None => d.polarisation,
        };
        let sources = match point_sources {
            Some(s) => s
                .iter()
                .map(|s| parse_point_source(s))
                .collect::<Result<Vec<_>, _>>()?,
            None => d.sources,
        };

        Ok(SimulationParams {
            num_datasets: num_datasets.unwrap_or(d.num_datasets),
            num_antennas: num_antennas.unwrap_or(d.num_antennas),
            array_radius: array_radius.unwrap_or(d.array_radius),
            num_times: num_times.unwrap_or(d.num_times),
            integration_time: integration_time.unwrap_or(d.integration_time),
            num_chans_per_dataset: num_chans_per_dataset.unwrap_or(d.num_chans_per_dataset),
            freq_start: freq_start.map(|f| f * 1e6).unwrap_or(d.freq_start),
            freq_res: freq_res.map(|f| f * 1e6).unwrap_or(d.freq_res),
            phase_centre_ra: ra.unwrap_or(d.phase_centre_ra),
            phase_centre_dec: dec.unwrap_or(d.phase_centre_dec),
            array_latitude: d.array_latitude,
            npixel: npixel.unwrap_or(d.npixel),
            cellsize: cellsize.unwrap_or(d.cellsize),
            image_nchan: image_nchan.unwrap_or(d.image_nchan),
            polarisation,
            sources,
            gain_amplitude_error: gain_amplitude_error.unwrap_or(d.gain_amplitude_error),
            gain_phase_error: gain_phase_error.unwrap_or(d.gain_phase_error),
        })
    }
}

/// Parse "X,Y,FLUX_DENSITY".
fn parse_point_source(s: &str) -> Result<PointSource, ArgsError> {
    let bad = || ArgsError::BadPointSource(s.to_string());
    let (x, y, flux_density) = s
        .split(',')
        .map(str::trim)
        .collect_tuple()
        .ok_or_else(bad)?;
    Ok(PointSource {
        x: x.parse().map_err(|_| bad())?,
        y: y.parse().map_err(|_| bad())?,
        flux_density: flux_density.parse().map_err(|_| bad())?,
    })
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ImagingArgs {
    #[clap(long, help = CONTEXT_HELP.as_str(), help_heading = "IMAGING")]
    pub(super) context: Option<String>,

    /// The number of facets along each image axis. Default: 1
    #[clap(long, help_heading = "IMAGING")]
    pub(super) facets: Option<usize>,

    /// The number of slices each visibility dataset is split into. Default: 1
    #[clap(long, help_heading = "IMAGING")]
    pub(super) vis_slices: Option<usize>,

    #[clap(long, help = WEIGHTING_HELP.as_str(), help_heading = "IMAGING")]
    pub(super) weighting: Option<String>,

    /// Don't normalise inversions by their sum of weights.
    #[clap(long, help_heading = "IMAGING")]
    #[serde(default)]
    pub(super) no_normalize: bool,
}

impl ImagingArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        ImagingArgs {
            context: self.context.or(other.context),
            facets: self.facets.or(other.facets),
            vis_slices: self.vis_slices.or(other.vis_slices),
            weighting: self.weighting.or(other.weighting),
            no_normalize: self.no_normalize || other.no_normalize,
        }
    }

    pub(super) fn parse(self) -> Result<(ImagingParams, Weighting), ArgsError> {
        let ImagingArgs {
            context,
            facets,
            vis_slices,
            weighting,
            no_normalize,
        } = self;

        let context = ImagingContext::parse(context.as_deref().unwrap_or(DEFAULT_CONTEXT))?;
        let facets = facets.unwrap_or(DEFAULT_FACETS);
        let vis_slices = vis_slices.unwrap_or(DEFAULT_VIS_SLICES);
        // Catch impossible combinations before anything is simulated.
        context.resolve(facets, vis_slices)?;

        let weighting = match weighting {
            Some(w) => {
                Weighting::from_str(&w).map_err(|_| ArgsError::UnknownWeighting { got: w })?
            }
            None => Weighting::default(),
        };

        Ok((
            ImagingParams {
                context,
                facets,
                vis_slices,
                normalize: !no_normalize,
            },
            weighting,
        ))
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct DeconvolveArgs {
    #[clap(long, help = NITER_HELP.as_str(), help_heading = "DECONVOLUTION")]
    pub(super) niter: Option<usize>,

    #[clap(long, help = CLEAN_GAIN_HELP.as_str(), help_heading = "DECONVOLUTION")]
    pub(super) clean_gain: Option<f64>,

    /// Stop cleaning a plane once its peak is below this [Jy]. Default: 0
    #[clap(long, help_heading = "DECONVOLUTION")]
    pub(super) threshold: Option<f64>,

    #[clap(long, help = FRACTIONAL_THRESHOLD_HELP.as_str(), help_heading = "DECONVOLUTION")]
    pub(super) fractional_threshold: Option<f64>,

    /// Deconvolve this many facets along each image axis independently. The
    /// default is to deconvolve the whole image at once.
    #[clap(long, conflicts_with = "deconvolve-channels", help_heading = "DECONVOLUTION")]
    pub(super) deconvolve_facets: Option<usize>,

    /// Deconvolve this many groups of channels independently.
    #[clap(long, help_heading = "DECONVOLUTION")]
    pub(super) deconvolve_channels: Option<usize>,
}

impl DeconvolveArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        // Facets and channels exclude each other; whichever the CLI asks for
        // wins over the file.
        let (deconvolve_facets, deconvolve_channels) =
            if self.deconvolve_facets.is_some() || self.deconvolve_channels.is_some() {
                (self.deconvolve_facets, self.deconvolve_channels)
            } else {
                (other.deconvolve_facets, other.deconvolve_channels)
            };
        DeconvolveArgs {
            niter: self.niter.or(other.niter),
            clean_gain: self.clean_gain.or(other.clean_gain),
            threshold: self.threshold.or(other.threshold),
            fractional_threshold: self.fractional_threshold.or(other.fractional_threshold),
            deconvolve_facets,
            deconvolve_channels,
        }
    }

    pub(super) fn parse(self) -> DeconvolveParams {
        let DeconvolveArgs {
            niter,
            clean_gain,
            threshold,
            fractional_threshold,
            deconvolve_facets,
            deconvolve_channels,
        } = self;

        let d = DeconvolveParams::default();
        let mode = match (deconvolve_facets, deconvolve_channels) {
            (Some(f), _) => DeconvolveMode::Facets(f),
            (None, Some(c)) => DeconvolveMode::Channels(c),
            (None, None) => DeconvolveMode::Whole,
        };
        DeconvolveParams {
            niter: niter.unwrap_or(d.niter),
            gain: clean_gain.unwrap_or(d.gain),
            threshold: threshold.unwrap_or(d.threshold),
            fractional_threshold: fractional_threshold.unwrap_or(d.fractional_threshold),
            mode,
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct CalibrateArgs {
    #[clap(long, help = MAX_ITERATIONS_HELP.as_str(), help_heading = "CALIBRATION")]
    pub(super) max_iterations: Option<u32>,

    #[clap(long, help = STOP_THRESHOLD_HELP.as_str(), help_heading = "CALIBRATION")]
    pub(super) stop_threshold: Option<f64>,

    #[clap(long, help = MIN_THRESHOLD_HELP.as_str(), help_heading = "CALIBRATION")]
    pub(super) min_threshold: Option<f64>,

    /// The length of each solution interval [seconds]. The default is one
    /// solution for all times.
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) solution_interval: Option<f64>,

    /// Solve for each channel separately.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub(super) per_channel: bool,

    /// Solve for each dataset separately, rather than once for all datasets.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub(super) local_solution: bool,
}

impl CalibrateArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        CalibrateArgs {
            max_iterations: self.max_iterations.or(other.max_iterations),
            stop_threshold: self.stop_threshold.or(other.stop_threshold),
            min_threshold: self.min_threshold.or(other.min_threshold),
            solution_interval: self.solution_interval.or(other.solution_interval),
            per_channel: self.per_channel || other.per_channel,
            local_solution: self.local_solution || other.local_solution,
        }
    }

    pub(super) fn parse(self) -> CalibrateParams {
        let CalibrateArgs {
            max_iterations,
            stop_threshold,
            min_threshold,
            solution_interval,
            per_channel,
            local_solution,
        } = self;

        let d = CalibrateParams::default();
        CalibrateParams {
            max_iterations: max_iterations.unwrap_or(d.max_iterations),
            stop_threshold: stop_threshold.unwrap_or(d.stop_threshold),
            min_threshold: min_threshold.unwrap_or(d.min_threshold),
            solution_interval: solution_interval.or(d.solution_interval),
            per_channel,
            global_solution: !local_solution,
        }
    }
}

/// Arguments controlling how a pipeline is run.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct PipelineArgs {
    #[clap(long, help = NMAJOR_HELP.as_str(), help_heading = "PIPELINE")]
    pub(super) nmajor: Option<usize>,

    /// The number of worker threads computing the graph. The default is the
    /// number of available cores.
    #[clap(short = 'j', long, help_heading = "PIPELINE")]
    pub(super) num_workers: Option<usize>,

    /// Write a json summary of the results to this file rather than stdout.
    #[clap(short, long, help_heading = "PIPELINE")]
    pub(super) output: Option<std::path::PathBuf>,
}

impl PipelineArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        PipelineArgs {
            nmajor: self.nmajor.or(other.nmajor),
            num_workers: self.num_workers.or(other.num_workers),
            output: self.output.or(other.output),
        }
    }

    pub(super) fn num_workers(&self) -> Result<usize, ArgsError> {
        match self.num_workers {
            Some(0) => Err(ArgsError::ZeroWorkers),
            Some(n) => Ok(n),
            None => Ok(rayon::current_num_threads()),
        }
    }
}

/// The inputs of a pipeline: a simulated observation, and plans of its
/// (weighted) datasets and image template.
pub(super) struct PipelineInputs {
    pub(super) obs: SimulatedObservation,
    pub(super) vis: Vec<Plan<MaybeVis>>,
    pub(super) template: Plan<MaybeImage>,
}

impl PipelineInputs {
    pub(super) fn new(
        sim_params: &SimulationParams,
        builder: &GraphBuilder,
        weighting: Weighting,
    ) -> Result<PipelineInputs, ImagingGraphsError> {
        let obs = simulate_observation(sim_params)?;
        let (nchan, npol, ny, nx) = obs.template.shape();
        info!(
            "Simulated {} dataset(s) of {} antennas; image is {nx}x{ny} pixels, {nchan} channel(s), {npol} polarisation(s)",
            obs.blocks.len(),
            sim_params.num_antennas
        );

        let blocks = obs
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| Plan::value(format!("block_vis[{i}]"), Some(b.clone()) as MaybeBlockVis))
            .collect::<Vec<_>>();
        let template = Plan::value("template", Some(obs.template.clone()));
        let mut vis = builder.coalesce(&blocks);
        if weighting != Weighting::Natural {
            debug!("Reweighting visibilities with {weighting} weighting");
            vis = builder.weight(&vis, &template, weighting);
        }

        Ok(PipelineInputs { obs, vis, template })
    }
}

/// A json summary of a pipeline's results.
#[derive(Debug, Serialize)]
pub(super) struct PipelineSummary {
    pub(super) pipeline: &'static str,
    pub(super) context: String,
    pub(super) nmajor: usize,
    /// (channels, polarisations, y, x)
    pub(super) image_shape: [usize; 4],
    pub(super) true_flux: f64,
    /// `None` if no model could be made.
    pub(super) model_flux: Option<f64>,
    pub(super) psf_peak: f64,
    pub(super) residual_peak: f64,
    pub(super) residual_sum_weights: f64,
    /// The sum of the data weights of each calibrated dataset; rows whose
    /// gains couldn't be solved have no weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) calibrated_sum_weights: Option<Vec<f64>>,
    pub(super) elapsed_seconds: f64,
}

impl PipelineSummary {
    /// Write the summary as json to `output`, or stdout if there is no
    /// output.
    pub(super) fn write(&self, output: Option<&Path>) -> Result<(), ImagingGraphsError> {
        let json = serde_json::to_string_pretty(self)?;
        match output {
            Some(path) => {
                std::fs::write(path, json)?;
                info!("Wrote summary to {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

/// The largest absolute pixel of an image.
pub(super) fn peak(image: &Image) -> f64 {
    image.data.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}
