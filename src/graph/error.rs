// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::error::ImagingError;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Task '{name}' failed: {source}")]
    Task {
        name: String,
        #[source]
        source: ImagingError,
    },

    #[error("Task '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("The output of '{name}' was not of the requested type")]
    Downcast { name: String },

    #[error("The engine had {before} workers before the batch was submitted, but only {after} afterwards")]
    LostWorkers { before: usize, after: usize },

    #[error("The engine stopped before the batch completed")]
    Disconnected,

    #[error("Couldn't build a thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
