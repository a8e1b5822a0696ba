// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image-plane deconvolution.

mod error;

pub use error::DeconvolveError;

use log::trace;
use ndarray::{parallel::prelude::*, prelude::*};

use crate::{image::Image, params::DeconvolveParams};

/// Hogbom CLEAN each (channel, polarisation) plane of `dirty` with the
/// matching plane of `psf`. Returns the CLEAN components and the residual
/// image, both on the grid of `dirty`.
///
/// Each PSF plane is normalised by its centre pixel, which is at (ny / 2, nx /
/// 2). The PSF may be larger than the dirty image; it is clipped to the image
/// wherever it is placed. A plane whose PSF centre is zero (e.g. a channel
/// without any data) is left untouched.
pub fn hogbom_clean(
    dirty: &Image,
    psf: &Image,
    params: &DeconvolveParams,
) -> Result<(Image, Image), DeconvolveError> {
    let (nchan, npol, ny, nx) = dirty.shape();
    let (psf_nchan, psf_npol, psf_ny, psf_nx) = psf.shape();
    if nchan != psf_nchan || npol != psf_npol {
        return Err(DeconvolveError::PlaneMismatch {
            dirty: nchan,
            dirty_pols: npol,
            psf: psf_nchan,
            psf_pols: psf_npol,
        });
    }
    if psf_ny < ny || psf_nx < nx {
        return Err(DeconvolveError::PsfTooSmall {
            ny,
            nx,
            psf_ny,
            psf_nx,
        });
    }
    if !(params.gain > 0.0 && params.gain <= 1.0) {
        return Err(DeconvolveError::BadGain(params.gain));
    }

    let mut components = dirty.empty_like();
    let mut residual = dirty.clone();
    components
        .data
        .outer_iter_mut()
        .into_par_iter()
        .zip(residual.data.outer_iter_mut().into_par_iter())
        .zip(psf.data.outer_iter().into_par_iter())
        .enumerate()
        .for_each(|(i_chan, ((mut comp_chan, mut res_chan), psf_chan))| {
            for (i_pol, ((comp, res), psf_plane)) in comp_chan
                .outer_iter_mut()
                .zip(res_chan.outer_iter_mut())
                .zip(psf_chan.outer_iter())
                .enumerate()
            {
                let num_iterations = clean_plane(comp, res, psf_plane, params);
                trace!("Channel {i_chan} polarisation {i_pol}: {num_iterations} CLEAN iterations");
            }
        });

    Ok((components, residual))
}

/// CLEAN a single plane in place, returning the number of iterations done.
fn clean_plane(
    mut comp: ArrayViewMut2<f64>,
    mut res: ArrayViewMut2<f64>,
    psf: ArrayView2<f64>,
    params: &DeconvolveParams,
) -> usize {
    let (ny, nx) = res.dim();
    let (psf_ny, psf_nx) = psf.dim();
    let (cy, cx) = (psf_ny / 2, psf_nx / 2);
    let psf_peak = psf[(cy, cx)];
    if psf_peak == 0.0 {
        return 0;
    }
    let psf = psf.mapv(|v| v / psf_peak);

    let initial_peak = res.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let limit = params
        .threshold
        .max(params.fractional_threshold * initial_peak);

    for i_iter in 0..params.niter {
        let ((y, x), peak) = res.indexed_iter().fold(
            ((0, 0), 0.0_f64),
            |best, (i, &v)| if v.abs() > best.1.abs() { (i, v) } else { best },
        );
        if peak == 0.0 || peak.abs() < limit {
            return i_iter;
        }

        let flux = params.gain * peak;
        comp[(y, x)] += flux;

        // The image region covered by the PSF centred on (y, x), and the
        // corresponding PSF region.
        let y0 = y.saturating_sub(cy);
        let y1 = (y + psf_ny - cy).min(ny);
        let x0 = x.saturating_sub(cx);
        let x1 = (x + psf_nx - cx).min(nx);
        let py0 = y0 + cy - y;
        let px0 = x0 + cx - x;
        res.slice_mut(s![y0..y1, x0..x1]).scaled_add(
            -flux,
            &psf.slice(s![py0..py0 + (y1 - y0), px0..px0 + (x1 - x0)]),
        );
    }
    params.niter
}
