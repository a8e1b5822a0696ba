// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all imaging-graphs-related errors. This should be the *only*
//! error enum that is publicly visible from the binary's code.

use thiserror::Error;

use super::common::ArgsError;
use crate::{context::ContextError, graph::GraphError, graphs::BuildError, simulate::SimulateError};

/// The *only* publicly visible error from the `imaging-graphs` binary.
#[derive(Error, Debug)]
pub enum ImagingGraphsError {
    /// An error related to argument files.
    #[error("{0}\n\nArgument files may be toml or json; their tables are named after the help headings of each subcommand.")]
    ArgFile(String),

    /// Arguments that make no sense together, or on their own.
    #[error("{0}")]
    Args(String),

    /// An error related to imaging contexts.
    #[error("{0}\n\nSee the help text of --context for the valid combinations of facets and slices.")]
    Context(String),

    /// The observation couldn't be simulated.
    #[error("Couldn't simulate the observation: {0}")]
    Simulate(String),

    /// A graph couldn't be built.
    #[error("Couldn't build the imaging graph: {0}")]
    Build(String),

    /// A graph failed while being computed. Because tasks run on many
    /// threads, the failing task's name is included.
    #[error("{0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv) and maybe disabling progress bars.")]
    Graph(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<ArgsError> for ImagingGraphsError {
    fn from(e: ArgsError) -> Self {
        let s = e.to_string();
        match e {
            ArgsError::Context(e) => Self::from(e),
            ArgsError::UnknownPolarisation { .. }
            | ArgsError::UnknownWeighting { .. }
            | ArgsError::BadPointSource(_)
            | ArgsError::ZeroWorkers => Self::Args(s),
        }
    }
}

impl From<ContextError> for ImagingGraphsError {
    fn from(e: ContextError) -> Self {
        Self::Context(e.to_string())
    }
}

impl From<SimulateError> for ImagingGraphsError {
    fn from(e: SimulateError) -> Self {
        Self::Simulate(e.to_string())
    }
}

impl From<BuildError> for ImagingGraphsError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Context(e) => Self::from(e),
            BuildError::LengthMismatch { .. } | BuildError::ZeroPartitions(_) => {
                Self::Build(e.to_string())
            }
        }
    }
}

impl From<GraphError> for ImagingGraphsError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e.to_string())
    }
}

impl From<std::io::Error> for ImagingGraphsError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<serde_json::Error> for ImagingGraphsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<toml::ser::Error> for ImagingGraphsError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
