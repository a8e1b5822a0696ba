// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeconvolveError {
    #[error("The dirty image has {dirty} channels and {dirty_pols} polarisations, but the PSF has {psf} channels and {psf_pols} polarisations")]
    PlaneMismatch {
        dirty: usize,
        dirty_pols: usize,
        psf: usize,
        psf_pols: usize,
    },

    #[error("The PSF ({psf_ny}x{psf_nx} pixels) is smaller than the dirty image ({ny}x{nx} pixels)")]
    PsfTooSmall {
        ny: usize,
        nx: usize,
        psf_ny: usize,
        psf_nx: usize,
    },

    #[error("The CLEAN loop gain must be in (0, 1], but got {0}")]
    BadGain(f64),
}
