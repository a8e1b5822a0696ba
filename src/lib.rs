// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Distributed computation graphs for radio-interferometric synthesis imaging.

Visibility datasets and image templates are wired into deferred [`Plan`]s;
nothing is computed until a list of plans is handed to an [`Engine`] (see
[`compute_list`]). The number of sub-tasks in every plan is fixed when the
plan is built, and any sub-task may legitimately produce no data (`None`).
 */

pub mod calibrate;
pub mod cli;
pub mod constants;
pub mod context;
pub mod deconvolve;
mod error;
pub mod graph;
pub mod graphs;
pub mod image;
pub mod imaging;
pub(crate) mod math;
pub mod params;
pub mod partition;
pub mod primitives;
pub mod simulate;
pub mod vis;

// Re-exports.
pub use calibrate::{CalibrateError, GainTable};
pub use cli::{ImagingGraphs, ImagingGraphsError};
pub use context::{ImagingContext, InnerLoop, ResolvedContext};
pub use deconvolve::DeconvolveError;
pub use error::ImagingError;
pub use graph::{
    compute, compute_list, Engine, GraphError, LocalEngine, Outputs, Plan, Submission, TaskGraph,
};
pub use graphs::{
    BuildError, ContinuumImaging, GraphBuilder, Ical, MaybeBlockVis, MaybeGainTable, MaybeImage,
    MaybeInvertResult, MaybeVis, ReduceError,
};
pub use image::{Image, ImageGrid, ImagePolarisation, InvertResult, SumWeights};
pub use params::{
    CalibrateParams, DeconvolveMode, DeconvolveParams, ImagingParams, PointSource,
    SimulationParams, Weighting,
};
pub use primitives::{CpuPrimitives, NumericPrimitives};
pub use vis::{BlockVisibility, Visibility};

use crossbeam_utils::atomic::AtomicCell;

/// Are progress bars being drawn? This should only ever be enabled by CLI
/// code.
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
