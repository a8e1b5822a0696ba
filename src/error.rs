// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error type of every task in an imaging graph.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("A task expected {expected} outputs from '{name}', but it produced {got}")]
    FanOut {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Vis(#[from] crate::vis::VisError),

    #[error(transparent)]
    Image(#[from] crate::image::ImageError),

    #[error(transparent)]
    Partition(#[from] crate::partition::PartitionError),

    #[error(transparent)]
    Reduce(#[from] crate::graphs::ReduceError),

    #[error(transparent)]
    Dft(#[from] crate::imaging::DftError),

    #[error(transparent)]
    Deconvolve(#[from] crate::deconvolve::DeconvolveError),

    #[error(transparent)]
    Calibrate(#[from] crate::calibrate::CalibrateError),
}
