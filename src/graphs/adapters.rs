// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Leaf tasks that tolerate missing data.
//!
//! The numeric primitives only ever see real data; every adapter here decides
//! what an absent input means for its output.

use ndarray::Array2;

use super::{reduce::sum_invert_results, MaybeGainTable, MaybeImage, MaybeInvertResult, MaybeVis, ReduceError};
use crate::{
    calibrate::GainTable,
    error::ImagingError,
    image::{Image, InvertResult},
    params::{CalibrateParams, DeconvolveParams, Weighting},
    primitives::NumericPrimitives,
    vis::Visibility,
};

/// Invert one visibility slice onto one image tile. The result is always
/// normalised; combining results re-weights them.
///
/// Without a tile there is nothing to image onto, so the result is `None`.
/// Without visibilities, the result is an empty tile with zero weight, which
/// contributes nothing when summed.
pub fn invert_ignore_none(
    prims: &dyn NumericPrimitives,
    vis: Option<&Visibility>,
    tile: Option<&Image>,
    dopsf: bool,
) -> Result<MaybeInvertResult, ImagingError> {
    let Some(tile) = tile else {
        return Ok(None);
    };
    match vis {
        Some(vis) => prims.invert_partition(vis, tile, dopsf, true).map(Some),
        None => Ok(Some((
            tile.empty_like(),
            Array2::zeros((tile.num_chans(), tile.num_pols())),
        ))),
    }
}

/// Predict the visibilities of one image tile at the rows of one slice.
pub fn predict_ignore_none(
    prims: &dyn NumericPrimitives,
    vis: Option<&Visibility>,
    tile: Option<&Image>,
) -> Result<MaybeVis, ImagingError> {
    match (vis, tile) {
        (Some(vis), Some(tile)) => prims.predict_partition(vis, tile).map(Some),
        _ => Ok(None),
    }
}

pub fn weight_ignore_none(
    prims: &dyn NumericPrimitives,
    vis: Option<&Visibility>,
    model: Option<&Image>,
    scheme: Weighting,
) -> Result<MaybeVis, ImagingError> {
    match (vis, model) {
        (Some(vis), Some(model)) => prims.weight_visibility(vis, model, scheme).map(Some),
        _ => Ok(None),
    }
}

/// Deconvolve `dirty` with `psf` and add the components to a copy of `model`.
/// Without a model there is nothing to add to; without a dirty image or PSF,
/// the model is unchanged.
pub fn deconvolve_ignore_none(
    prims: &dyn NumericPrimitives,
    dirty: Option<&Image>,
    psf: Option<&Image>,
    model: Option<&Image>,
    params: &DeconvolveParams,
) -> Result<MaybeImage, ImagingError> {
    let Some(model) = model else {
        return Ok(None);
    };
    let mut model = model.clone();
    if let (Some(dirty), Some(psf)) = (dirty, psf) {
        let (components, _residual) = prims.deconvolve(dirty, psf, params)?;
        model.add_assign(&components)?;
    }
    Ok(Some(model))
}

/// Deconvolve `dirty` with `psf`, returning only the components.
pub fn clean_ignore_none(
    prims: &dyn NumericPrimitives,
    dirty: Option<&Image>,
    psf: Option<&Image>,
    params: &DeconvolveParams,
) -> Result<MaybeImage, ImagingError> {
    match (dirty, psf) {
        (Some(dirty), Some(psf)) => {
            let (components, _residual) = prims.deconvolve(dirty, psf, params)?;
            Ok(Some(components))
        }
        _ => Ok(None),
    }
}

/// Solve for gains. A `None` model is only allowed if `point_source` is set,
/// in which case the model is a unit point source at the phase centre.
pub fn solve_ignore_none(
    prims: &dyn NumericPrimitives,
    vis: Option<&Visibility>,
    model: Option<&Visibility>,
    point_source: bool,
    params: &CalibrateParams,
) -> Result<MaybeGainTable, ImagingError> {
    match (vis, model) {
        (Some(vis), model @ Some(_)) => prims.solve_gains(vis, model, params).map(Some),
        (Some(vis), None) if point_source => prims.solve_gains(vis, None, params).map(Some),
        _ => Ok(None),
    }
}

pub fn apply_ignore_none(
    prims: &dyn NumericPrimitives,
    vis: Option<&Visibility>,
    gain_table: Option<&GainTable>,
    inverse: bool,
) -> Result<MaybeVis, ImagingError> {
    match (vis, gain_table) {
        (Some(vis), Some(gain_table)) => prims.apply_gains(vis, gain_table, inverse).map(Some),
        _ => Ok(None),
    }
}

/// Sum partial inversion results where having none is not an error.
pub fn sum_invert_ignore_none(
    results: &[Option<&InvertResult>],
) -> Result<MaybeInvertResult, ImagingError> {
    match sum_invert_results(results) {
        Ok(result) => Ok(Some(result)),
        Err(ReduceError::NoInvertResults) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
