// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The numeric kernels run by the leaves of imaging graphs.
//!
//! Graph builders only ever talk to a [`NumericPrimitives`] trait object, so
//! the kernels can be swapped without touching any graph code. Arguments are
//! never null; null handling lives in the graph adapters.

use crate::{
    calibrate::{apply_gaintable, solve_gaintable, GainTable},
    deconvolve::hogbom_clean,
    error::ImagingError,
    image::{Image, InvertResult},
    imaging::{invert_2d, predict_2d, weight_visibility},
    params::{CalibrateParams, DeconvolveParams, Weighting},
    vis::Visibility,
};

pub trait NumericPrimitives: Send + Sync {
    /// Image `vis` on the grid of `tile`. The dirty image or PSF is returned
    /// with its sum of weights.
    fn invert_partition(
        &self,
        vis: &Visibility,
        tile: &Image,
        dopsf: bool,
        normalize: bool,
    ) -> Result<InvertResult, ImagingError>;

    /// Predict the visibilities of `tile` at the rows of `vis`.
    fn predict_partition(&self, vis: &Visibility, tile: &Image)
        -> Result<Visibility, ImagingError>;

    /// Deconvolve `dirty` with `psf`, returning the components and the
    /// residual image.
    fn deconvolve(
        &self,
        dirty: &Image,
        psf: &Image,
        params: &DeconvolveParams,
    ) -> Result<(Image, Image), ImagingError>;

    /// Solve for antenna gains. A `None` model is a unit point source at the
    /// phase centre.
    fn solve_gains(
        &self,
        vis: &Visibility,
        model: Option<&Visibility>,
        params: &CalibrateParams,
    ) -> Result<GainTable, ImagingError>;

    /// Apply gains to (or, if `inverse`, remove gains from) visibilities.
    fn apply_gains(
        &self,
        vis: &Visibility,
        gain_table: &GainTable,
        inverse: bool,
    ) -> Result<Visibility, ImagingError>;

    /// Set the imaging weights of visibilities against the uv grid of `model`.
    fn weight_visibility(
        &self,
        vis: &Visibility,
        model: &Image,
        scheme: Weighting,
    ) -> Result<Visibility, ImagingError>;
}

/// Kernels running on the CPU: a direct Fourier transform, Hogbom CLEAN and an
/// antenna-based gain solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPrimitives;

impl NumericPrimitives for CpuPrimitives {
    fn invert_partition(
        &self,
        vis: &Visibility,
        tile: &Image,
        dopsf: bool,
        normalize: bool,
    ) -> Result<InvertResult, ImagingError> {
        Ok(invert_2d(vis, tile, dopsf, normalize)?)
    }

    fn predict_partition(
        &self,
        vis: &Visibility,
        tile: &Image,
    ) -> Result<Visibility, ImagingError> {
        Ok(predict_2d(vis, tile)?)
    }

    fn deconvolve(
        &self,
        dirty: &Image,
        psf: &Image,
        params: &DeconvolveParams,
    ) -> Result<(Image, Image), ImagingError> {
        Ok(hogbom_clean(dirty, psf, params)?)
    }

    fn solve_gains(
        &self,
        vis: &Visibility,
        model: Option<&Visibility>,
        params: &CalibrateParams,
    ) -> Result<GainTable, ImagingError> {
        Ok(solve_gaintable(vis, model, params)?)
    }

    fn apply_gains(
        &self,
        vis: &Visibility,
        gain_table: &GainTable,
        inverse: bool,
    ) -> Result<Visibility, ImagingError> {
        Ok(apply_gaintable(vis, gain_table, inverse)?)
    }

    fn weight_visibility(
        &self,
        vis: &Visibility,
        model: &Image,
        scheme: Weighting,
    ) -> Result<Visibility, ImagingError> {
        Ok(weight_visibility(vis, model, scheme)?)
    }
}
