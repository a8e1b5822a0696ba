// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{imaging::DftError, vis::VisError};

#[derive(Error, Debug)]
pub enum SimulateError {
    #[error("At least 2 antennas are needed to simulate visibilities, but {0} were requested")]
    TooFewAntennas(usize),

    #[error("Cannot simulate zero {0}")]
    Zero(&'static str),

    #[error("The image must have 1 channel or {total} channels (one per simulated channel), but {got} were requested")]
    ImageChannels { got: usize, total: usize },

    #[error("Point source at pixel offset ({x}, {y}) is outside the {npixel}x{npixel} image")]
    SourceOutsideImage { x: i64, y: i64, npixel: usize },

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    Dft(#[from] DftError),
}
