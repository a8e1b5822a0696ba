// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for building and running imaging graphs.
//!
//! The `cli` module deals with unparsed, user-facing arguments; everything here
//! is ready to be used directly. All parameter structs can be read from
//! argument files, and any field that isn't specified takes its default.


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{constants::*, context::ImagingContext, image::ImagePolarisation};

lazy_static::lazy_static! {
    pub(crate) static ref WEIGHTINGS_COMMA_SEPARATED: String = Weighting::iter().join(", ");
}

/// How the imaging weights of visibilities are set.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Imaging weights are the data weights.
    #[default]
    #[strum(serialize = "natural")]
    Natural,

    /// Data weights are divided by the weight density of the uv grid.
    #[strum(serialize = "uniform")]
    Uniform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingParams {
    /// How invert and predict are decomposed.
    pub context: ImagingContext,

    /// The number of facets along each image axis.
    pub facets: usize,

    /// The number of slices each visibility dataset is split into.
    pub vis_slices: usize,

    /// Should inversions be normalised by their sum of weights?
    pub normalize: bool,
}

impl Default for ImagingParams {
    fn default() -> Self {
        ImagingParams {
            context: ImagingContext::TwoD,
            facets: DEFAULT_FACETS,
            vis_slices: DEFAULT_VIS_SLICES,
            normalize: true,
        }
    }
}

/// How a dirty image is split for deconvolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeconvolveMode {
    /// Deconvolve the whole image at once.
    #[default]
    Whole,

    /// Deconvolve facets independently; this is the number of facets along
    /// each image axis.
    Facets(usize),

    /// Deconvolve each of this many groups of channels independently.
    Channels(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolveParams {
    /// The maximum number of CLEAN iterations per image plane.
    pub niter: usize,

    /// The fraction of the peak removed in each iteration.
    pub gain: f64,

    /// Stop cleaning a plane once its peak is below this \[Jy\].
    pub threshold: f64,

    /// Stop cleaning a plane once its peak is below this fraction of its
    /// initial peak.
    pub fractional_threshold: f64,

    pub mode: DeconvolveMode,
}

impl Default for DeconvolveParams {
    fn default() -> Self {
        DeconvolveParams {
            niter: DEFAULT_CLEAN_NITER,
            gain: DEFAULT_CLEAN_GAIN,
            threshold: DEFAULT_CLEAN_THRESHOLD,
            fractional_threshold: DEFAULT_CLEAN_FRACTIONAL_THRESHOLD,
            mode: DeconvolveMode::Whole,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateParams {
    /// The maximum number of iterations for each solution.
    pub max_iterations: u32,

    /// A solution converges once its precision is below this.
    pub stop_threshold: f64,

    /// A solution that never reaches the stop threshold is still considered
    /// converged if its precision is below this.
    pub min_threshold: f64,

    /// The length of each solution interval \[seconds\]. If not given, all
    /// times share one solution.
    pub solution_interval: Option<f64>,

    /// Solve for each channel separately, rather than one solution for all
    /// channels.
    pub per_channel: bool,

    /// Solve once for all datasets together, rather than for each dataset
    /// separately.
    pub global_solution: bool,
}

impl Default for CalibrateParams {
    fn default() -> Self {
        CalibrateParams {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            min_threshold: DEFAULT_MIN_THRESHOLD,
            solution_interval: None,
            per_channel: false,
            global_solution: true,
        }
    }
}

/// A point source on the image grid. The pixel is relative to the image
/// centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub x: i64,
    pub y: i64,

    /// \[Jy\]
    pub flux_density: f64,
}

/// Parameters of a synthetic observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// The number of visibility datasets to make. Each covers its own block of
    /// channels.
    pub num_datasets: usize,

    pub num_antennas: usize,

    /// The radius of the outermost antenna from the array centre \[metres\].
    pub array_radius: f64,

    pub num_times: usize,

    /// \[seconds\]
    pub integration_time: f64,

    /// The number of channels in each dataset.
    pub num_chans_per_dataset: usize,

    /// The frequency of the first channel \[Hz\].
    pub freq_start: f64,

    /// \[Hz\]
    pub freq_res: f64,

    /// The phase centre right ascension \[degrees\].
    pub phase_centre_ra: f64,

    /// The phase centre declination \[degrees\].
    pub phase_centre_dec: f64,

    /// The latitude of the array \[degrees\].
    pub array_latitude: f64,

    /// The number of pixels along each image axis.
    pub npixel: usize,

    /// \[radians\]
    pub cellsize: f64,

    /// The number of image channels. This is either 1, or the total number of
    /// channels over all datasets.
    pub image_nchan: usize,

    pub polarisation: ImagePolarisation,

    pub sources: Vec<PointSource>,

    /// The largest fractional error of the simulated antenna gain amplitudes.
    /// Zero gives uncorrupted data.
    pub gain_amplitude_error: f64,

    /// The largest error of the simulated antenna gain phases \[radians\].
    pub gain_phase_error: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            num_datasets: 2,
            num_antennas: 8,
            array_radius: 300.0,
            num_times: 4,
            integration_time: 600.0,
            num_chans_per_dataset: 1,
            freq_start: 150e6,
            freq_res: 10e6,
            phase_centre_ra: 0.0,
            phase_centre_dec: -45.0,
            array_latitude: -26.7,
            npixel: 32,
            cellsize: 0.001,
            image_nchan: 1,
            polarisation: ImagePolarisation::StokesI,
            sources: vec![
                PointSource {
                    x: 0,
                    y: 0,
                    flux_density: 1.0,
                },
                PointSource {
                    x: 5,
                    y: -3,
                    flux_density: 0.5,
                },
            ],
            gain_amplitude_error: 0.0,
            gain_phase_error: 0.0,
        }
    }
}
