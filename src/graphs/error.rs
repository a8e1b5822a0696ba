// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{context::ContextError, image::ImageError, vis::VisError};

/// Errors found while building graphs. Nothing has been computed when these
/// are raised.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Got {vis} visibility plans, but {got} {what} plans to pair them with")]
    LengthMismatch {
        what: &'static str,
        vis: usize,
        got: usize,
    },

    #[error("Cannot deconvolve with zero {0}")]
    ZeroPartitions(&'static str),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Errors combining partial results.
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("There were no invert results to sum; every partial result was empty")]
    NoInvertResults,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Vis(#[from] VisError),
}
