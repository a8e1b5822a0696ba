// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::vis::VisError;

#[derive(Error, Debug)]
pub enum CalibrateError {
    #[error("Cannot calibrate without any visibilities")]
    NoData,

    #[error("The data have {vis} rows, but the model has {model} rows")]
    ModelRows { vis: usize, model: usize },

    #[error("The solution interval must be positive, but got {0} s")]
    BadSolutionInterval(f64),

    #[error("Channel {0} has no calibration solutions")]
    UnsolvedChannel(usize),

    #[error("Antenna {antenna} has no calibration solutions; the gain table only has {num_antennas} antennas")]
    AntennaOutOfRange { antenna: usize, num_antennas: usize },

    #[error(transparent)]
    Vis(#[from] VisError),
}
