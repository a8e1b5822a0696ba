// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Direct-Fourier-transform imaging of visibilities, and its inverse.
//!
//! Each visibility row contributes to one image channel: channel 0 if the
//! image has a single channel, otherwise the row's own channel index. For
//! Stokes I images, the image is (XX + YY) / 2 and predicted visibilities have
//! XX = YY = I. Linear images map one-to-one to the elements of the Jones
//! matrices.

mod error;
mod weighting;

pub use error::DftError;
pub use weighting::weight_visibility;

use marlu::{c64, Jones, UVW};
use ndarray::{parallel::prelude::*, prelude::*, Zip};

use crate::{
    image::{Image, ImagePolarisation, InvertResult, SumWeights},
    math::{cexp, fringe_phase, uvw_in_wavelengths},
    vis::Visibility,
};

/// The image channel a visibility row with channel `channel` contributes to.
#[inline]
pub(crate) fn image_channel(channel: usize, nchan: usize) -> Result<usize, DftError> {
    if nchan == 1 {
        Ok(0)
    } else if channel < nchan {
        Ok(channel)
    } else {
        Err(DftError::ChannelOutOfRange { channel, nchan })
    }
}

/// The values of a Jones matrix that correspond to each polarisation plane.
#[inline]
fn jones_to_pols(j: Jones<f64>, polarisation: ImagePolarisation) -> [c64; 4] {
    match polarisation {
        ImagePolarisation::StokesI => [
            (j[0] + j[3]) * 0.5,
            c64::default(),
            c64::default(),
            c64::default(),
        ],
        ImagePolarisation::Linear => [j[0], j[1], j[2], j[3]],
    }
}

/// The Jones matrix that a set of polarisation plane values represents.
#[inline]
fn pols_to_jones(p: [c64; 4], polarisation: ImagePolarisation) -> Jones<f64> {
    match polarisation {
        ImagePolarisation::StokesI => Jones::from([p[0], c64::default(), c64::default(), p[0]]),
        ImagePolarisation::Linear => Jones::from(p),
    }
}

/// Make an image of `vis` on the grid of `template`. If `dopsf` is true, every
/// visibility is replaced by a unit point source at the phase centre, giving
/// the point-spread function. Returns the image and its sum of weights per
/// channel and polarisation. If `normalize` is true, each plane is divided by
/// its sum of weights.
pub fn invert_2d(
    vis: &Visibility,
    template: &Image,
    dopsf: bool,
    normalize: bool,
) -> Result<InvertResult, DftError> {
    let (nchan, npol, _, nx) = template.shape();
    let grid = &template.grid;
    let polarisation = grid.polarisation;

    // Pre-compute everything about each row that the pixel loop needs.
    let mut sumwt: SumWeights = Array2::zeros((nchan, npol));
    let mut rows_per_chan: Vec<Vec<(f64, UVW, [c64; 4])>> = vec![vec![]; nchan];
    for i_row in 0..vis.len() {
        let weight = vis.imaging_weight[i_row];
        if weight == 0.0 {
            continue;
        }
        let i_chan = image_channel(vis.channel[i_row], nchan)?;
        let uvw = uvw_in_wavelengths(vis.uvw[i_row], vis.frequency[i_row]);
        let values = if dopsf {
            jones_to_pols(Jones::identity(), polarisation)
        } else {
            jones_to_pols(vis.vis[i_row], polarisation)
        };
        sumwt.row_mut(i_chan).iter_mut().for_each(|s| *s += weight);
        rows_per_chan[i_chan].push((weight, uvw, values));
    }

    let mut image = template.empty_like();
    image
        .data
        .outer_iter_mut()
        .zip(rows_per_chan.iter())
        .for_each(|(mut chan_data, rows)| {
            // Parallelise over the y axis of every polarisation at once.
            let mut planes = chan_data.view_mut().permuted_axes([1, 0, 2]);
            planes
                .outer_iter_mut()
                .into_par_iter()
                .enumerate()
                .for_each(|(y, mut pol_row)| {
                    for x in 0..nx {
                        let (l, m) = grid.lm(y, x);
                        let mut acc = [0.0; 4];
                        for (weight, uvw, values) in rows {
                            let phasor = cexp(fringe_phase(*uvw, l, m));
                            for (a, v) in acc.iter_mut().zip(values.iter()).take(npol) {
                                *a += weight * (v * phasor).re;
                            }
                        }
                        for (p, a) in acc.into_iter().take(npol).enumerate() {
                            pol_row[(p, x)] = a;
                        }
                    }
                });
        });

    if normalize {
        normalize_sumwt(&mut image, &sumwt);
    }
    Ok((image, sumwt))
}

/// Divide each (channel, polarisation) plane of `image` by its weight. Planes
/// with non-positive weight are left alone.
pub fn normalize_sumwt(image: &mut Image, sumwt: &SumWeights) {
    image
        .data
        .outer_iter_mut()
        .zip(sumwt.outer_iter())
        .for_each(|(mut chan_data, chan_wt)| {
            chan_data
                .outer_iter_mut()
                .zip(chan_wt.iter())
                .filter(|(_, &wt)| wt > 0.0)
                .for_each(|(mut plane, &wt)| plane.mapv_inplace(|v| v / wt));
        });
}

/// Predict the visibilities of `model` at the rows of `vis`. The correlations
/// of the returned visibilities are replaced by the prediction; everything
/// else is copied from `vis`.
pub fn predict_2d(vis: &Visibility, model: &Image) -> Result<Visibility, DftError> {
    let (nchan, npol, ny, nx) = model.shape();
    let grid = &model.grid;
    let polarisation = grid.polarisation;

    // Only pixels with flux contribute.
    let components_per_chan: Vec<Vec<(f64, f64, [f64; 4])>> = (0..nchan)
        .map(|c| {
            let mut components = vec![];
            for y in 0..ny {
                for x in 0..nx {
                    let mut values = [0.0; 4];
                    for (p, v) in values.iter_mut().enumerate().take(npol) {
                        *v = model.data[(c, p, y, x)];
                    }
                    if values.iter().any(|&v| v != 0.0) {
                        let (l, m) = grid.lm(y, x);
                        components.push((l, m, values));
                    }
                }
            }
            components
        })
        .collect();

    let chans = vis
        .channel
        .iter()
        .map(|&c| image_channel(c, nchan))
        .collect::<Result<Array1<_>, _>>()?;

    let mut out = vis.clone();
    Zip::from(&mut out.vis)
        .and(&vis.uvw)
        .and(&vis.frequency)
        .and(&chans)
        .par_for_each(|vis_model, &uvw, &freq, &i_chan| {
            let uvw = uvw_in_wavelengths(uvw, freq);
            // Accumulate each polarisation before forming the Jones matrix.
            let mut acc = [c64::default(); 4];
            for (l, m, values) in &components_per_chan[i_chan] {
                let phasor = cexp(-fringe_phase(uvw, *l, *m));
                for (a, v) in acc.iter_mut().zip(values.iter()) {
                    *a += phasor * *v;
                }
            }
            *vis_model = pols_to_jones(acc, polarisation);
        });
    Ok(out)
}
