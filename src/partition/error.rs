// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with scattering and gathering partitions.

use thiserror::Error;

use crate::{image::ImageError, vis::VisError};

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("Cannot make zero partitions")]
    ZeroPartitions,

    #[error("The whole-dataset visibility partition has exactly 1 slice, but {0} were requested")]
    WholeNeedsOne(usize),

    #[error("{0} facets were requested, but this is not a square number")]
    FacetsNotSquare(usize),

    #[error("Image axes ({ny}, {nx}) are not divisible by {facets} facets per axis")]
    FacetsDontDivide { facets: usize, ny: usize, nx: usize },

    #[error("Cannot split {nchan} image channels into {n} partitions")]
    TooManyChannelPartitions { n: usize, nchan: usize },

    #[error("Expected {expected} partitions, but got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("Partition {index} has shape {got:?}, but its place in the image has shape {expected:?}")]
    TileShape {
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Partition {index} has {got} rows, but its place in the visibilities has {expected} rows")]
    RowCount {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
