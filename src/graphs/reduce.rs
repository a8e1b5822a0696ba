// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combining partial results.

use ndarray::prelude::*;

use super::ReduceError;
use crate::{
    image::{Image, InvertResult, SumWeights},
    imaging::normalize_sumwt,
    vis::Visibility,
};

/// Multiply each (channel, polarisation) plane of `image` by its weight.
fn scale_by_weights(image: &mut Image, weights: &SumWeights) {
    for ((chan, pol), &wt) in weights.indexed_iter() {
        image
            .data
            .slice_mut(s![chan, pol, .., ..])
            .mapv_inplace(|v| v * wt);
    }
}

/// Sum normalised inversion results. Each image is scaled by its own weights
/// before accumulation, the weights are summed, and the accumulated image is
/// then normalised by the summed weights. `None` entries are skipped, but at
/// least one entry must be present.
pub fn sum_invert_results(results: &[Option<&InvertResult>]) -> Result<InvertResult, ReduceError> {
    let mut present = results.iter().flatten();
    let (first_image, first_weights) = present.next().ok_or(ReduceError::NoInvertResults)?;
    first_image.check_weights(first_weights)?;

    let mut image = first_image.clone();
    scale_by_weights(&mut image, first_weights);
    let mut sumwt = first_weights.clone();
    for (part_image, part_weights) in present {
        image.check_same_shape(part_image)?;
        part_image.check_weights(part_weights)?;
        for ((chan, pol), &wt) in part_weights.indexed_iter() {
            image
                .data
                .slice_mut(s![chan, pol, .., ..])
                .scaled_add(wt, &part_image.data.slice(s![chan, pol, .., ..]));
        }
        sumwt += part_weights;
    }

    normalize_sumwt(&mut image, &sumwt);
    Ok((image, sumwt))
}

/// Sum predicted visibilities. The first present entry is copied and the
/// correlations of the others are added to it. If every entry is `None`, so is
/// the result.
pub fn sum_predict_results(
    results: &[Option<&Visibility>],
) -> Result<Option<Visibility>, ReduceError> {
    let mut present = results.iter().flatten();
    let Some(first) = present.next() else {
        return Ok(None);
    };
    let mut sum = (*first).clone();
    for part in present {
        sum.add_assign_vis(part)?;
    }
    Ok(Some(sum))
}

/// Undo the normalisation of an inversion result. Planes with non-positive
/// weight were never normalised, so they are left alone.
pub fn unnormalise(result: &InvertResult) -> InvertResult {
    let (image, weights) = result;
    let mut image = image.clone();
    let positive = weights.mapv(|wt| if wt > 0.0 { wt } else { 1.0 });
    scale_by_weights(&mut image, &positive);
    (image, weights.clone())
}
