// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with visibility datasets.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("Visibility column '{column}' has {got} rows, but {expected} rows were expected")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Block visibility array '{array}' has shape {got:?}, but {expected:?} was expected")]
    BlockShape {
        array: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Cannot combine visibilities with {left} and {right} rows")]
    ShapeMismatch { left: usize, right: usize },

    #[error("Tried to gather zero visibility datasets")]
    NothingToGather,
}
