// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::ImagePolarisation;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image has {nchan} channels, but its grid has {nfreq} frequencies")]
    Channels { nchan: usize, nfreq: usize },

    #[error("Image has {npol} polarisation planes, which doesn't match '{polarisation}'")]
    Polarisations {
        npol: usize,
        polarisation: ImagePolarisation,
    },

    #[error("Cannot combine images with shapes {left:?} and {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("Image has {nchan} channels and {npol} polarisations, but its weights have shape {shape:?}")]
    WeightShape {
        nchan: usize,
        npol: usize,
        shape: Vec<usize>,
    },
}
