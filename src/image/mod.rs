// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image cubes.
//!
//! An [`Image`] is a four-dimensional array (channel, polarisation, y, x) and
//! an [`ImageGrid`] relating pixels to direction cosines. A template image
//! fixes the shape and grid of everything derived from it.

mod error;

pub use error::ImageError;

use marlu::RADec;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The sum of weights of an inversion. The first dimension is channel, the
/// second is polarisation.
pub type SumWeights = Array2<f64>;

/// An image and the weights it was made with.
pub type InvertResult = (Image, SumWeights);

/// The polarisation planes of an image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum ImagePolarisation {
    /// A single plane of Stokes I.
    #[strum(serialize = "stokesI")]
    #[serde(rename = "stokesI")]
    StokesI,

    /// Four planes, XX, XY, YX and YY.
    #[strum(serialize = "linear")]
    #[serde(rename = "linear")]
    Linear,
}

impl ImagePolarisation {
    pub fn num_pols(self) -> usize {
        match self {
            ImagePolarisation::StokesI => 1,
            ImagePolarisation::Linear => 4,
        }
    }
}

/// The mapping between pixels and directions.
#[derive(Debug, Clone)]
pub struct ImageGrid {
    /// The angular size of a pixel \[radians\].
    pub cellsize: f64,

    /// The (x, y) pixel coordinates of the phase centre. Sub-images keep the
    /// coordinates of their parent by shifting this.
    pub crpix: (f64, f64),

    pub phase_centre: RADec,

    /// The frequency of each image channel \[Hz\].
    pub frequencies: Vec<f64>,

    pub polarisation: ImagePolarisation,
}

impl ImageGrid {
    /// The direction cosines (l, m) of pixel (y, x).
    #[inline]
    pub fn lm(&self, y: usize, x: usize) -> (f64, f64) {
        (
            (x as f64 - self.crpix.0) * self.cellsize,
            (y as f64 - self.crpix.1) * self.cellsize,
        )
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    /// Pixel values. The dimensions are channel, polarisation, y and x.
    pub data: Array4<f64>,

    pub grid: ImageGrid,
}

impl Image {
    /// Create a new [`Image`], checking that the data agree with the grid's
    /// channels and polarisations.
    pub fn new(data: Array4<f64>, grid: ImageGrid) -> Result<Image, ImageError> {
        let (nchan, npol, _, _) = data.dim();
        if nchan != grid.frequencies.len() {
            return Err(ImageError::Channels {
                nchan,
                nfreq: grid.frequencies.len(),
            });
        }
        if npol != grid.polarisation.num_pols() {
            return Err(ImageError::Polarisations {
                npol,
                polarisation: grid.polarisation,
            });
        }
        Ok(Image { data, grid })
    }

    /// Create an image of zeros with `ny` by `nx` pixels. The phase centre is
    /// at the centre pixel.
    pub fn zeros(
        ny: usize,
        nx: usize,
        cellsize: f64,
        phase_centre: RADec,
        frequencies: Vec<f64>,
        polarisation: ImagePolarisation,
    ) -> Image {
        let data = Array4::zeros((frequencies.len(), polarisation.num_pols(), ny, nx));
        Image {
            data,
            grid: ImageGrid {
                cellsize,
                crpix: ((nx / 2) as f64, (ny / 2) as f64),
                phase_centre,
                frequencies,
                polarisation,
            },
        }
    }

    /// An image with the same shape and grid as `self`, but with zero data.
    pub fn empty_like(&self) -> Image {
        Image {
            data: Array4::zeros(self.data.dim()),
            grid: self.grid.clone(),
        }
    }

    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    pub fn num_chans(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn num_pols(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Return an error if `other` doesn't have the same shape.
    pub fn check_same_shape(&self, other: &Image) -> Result<(), ImageError> {
        if self.shape() != other.shape() {
            return Err(ImageError::ShapeMismatch {
                left: self.data.shape().to_vec(),
                right: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Add the pixels of `other` to `self`.
    pub fn add_assign(&mut self, other: &Image) -> Result<(), ImageError> {
        self.check_same_shape(other)?;
        self.data += &other.data;
        Ok(())
    }

    /// Return an error if `weights` isn't shaped (channel, polarisation) like
    /// this image.
    pub fn check_weights(&self, weights: &SumWeights) -> Result<(), ImageError> {
        if weights.dim() != (self.num_chans(), self.num_pols()) {
            return Err(ImageError::WeightShape {
                nchan: self.num_chans(),
                npol: self.num_pols(),
                shape: weights.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// The sum of all pixels.
    pub fn total_flux(&self) -> f64 {
        self.data.sum()
    }
}
