// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Imaging weights.

use ndarray::prelude::*;

use super::{image_channel, DftError};
use crate::{image::Image, math::uvw_in_wavelengths, params::Weighting, vis::Visibility};

/// The uv cell (v index, u index) of a baseline with coordinates (u, v)
/// \[wavelengths\] on the Fourier grid of an image, if it lands on the grid.
fn uv_cell(u: f64, v: f64, du: f64, dv: f64, nu: usize, nv: usize) -> Option<(usize, usize)> {
    let iu = (u / du).round() as i64 + (nu / 2) as i64;
    let iv = (v / dv).round() as i64 + (nv / 2) as i64;
    if iu < 0 || iv < 0 || iu >= nu as i64 || iv >= nv as i64 {
        None
    } else {
        Some((iv as usize, iu as usize))
    }
}

/// Set the imaging weights of a copy of `vis`.
///
/// Natural weighting uses the data weights. Uniform weighting divides each
/// data weight by the total weight in its cell of the Fourier grid of `model`
/// (per image channel, counting both a baseline and its conjugate). Rows that
/// fall outside that grid cannot be imaged on it and get zero imaging weight.
pub fn weight_visibility(
    vis: &Visibility,
    model: &Image,
    scheme: Weighting,
) -> Result<Visibility, DftError> {
    let mut out = vis.clone();
    match scheme {
        Weighting::Natural => {
            out.imaging_weight.assign(&vis.weight);
        }

        Weighting::Uniform => {
            let (nchan, _, ny, nx) = model.shape();
            let du = 1.0 / (nx as f64 * model.grid.cellsize);
            let dv = 1.0 / (ny as f64 * model.grid.cellsize);

            let cells = (0..vis.len())
                .map(|i_row| {
                    let i_chan = image_channel(vis.channel[i_row], nchan)?;
                    let uvw = uvw_in_wavelengths(vis.uvw[i_row], vis.frequency[i_row]);
                    Ok((
                        i_chan,
                        uv_cell(uvw.u, uvw.v, du, dv, nx, ny),
                        uv_cell(-uvw.u, -uvw.v, du, dv, nx, ny),
                    ))
                })
                .collect::<Result<Vec<_>, DftError>>()?;

            let mut density = Array3::<f64>::zeros((nchan, ny, nx));
            for (&(i_chan, cell, conj_cell), &weight) in cells.iter().zip(vis.weight.iter()) {
                for (iv, iu) in [cell, conj_cell].into_iter().flatten() {
                    density[(i_chan, iv, iu)] += weight;
                }
            }

            for ((imaging_weight, &weight), &(i_chan, cell, _)) in out
                .imaging_weight
                .iter_mut()
                .zip(vis.weight.iter())
                .zip(cells.iter())
            {
                *imaging_weight = match cell {
                    Some((iv, iu)) if density[(i_chan, iv, iu)] > 0.0 => {
                        weight / density[(i_chan, iv, iu)]
                    }
                    _ => 0.0,
                };
            }
        }
    }
    Ok(out)
}
