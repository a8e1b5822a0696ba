// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


use marlu::{c64, UVW};

use crate::constants::{TAU, VEL_C};

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
///
/// # Examples
///
/// `assert_abs_diff_eq!(cexp(PI), c64::new(-1.0, 0.0));`
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// Given direction cosines `l` and `m`, get `n - 1`. Directions beyond the
/// celestial sphere (l^2 + m^2 > 1) are clamped to the horizon.
#[inline]
pub(crate) fn n_minus_one(l: f64, m: f64) -> f64 {
    let r2 = l * l + m * m;
    if r2 >= 1.0 {
        -1.0
    } else {
        // Written this way to keep precision for small l and m.
        -r2 / (1.0 + (1.0 - r2).sqrt())
    }
}

/// The phase (radians) of a baseline with `uvw` \[wavelengths\] towards the
/// direction (l, m).
#[inline]
pub(crate) fn fringe_phase(uvw: UVW, l: f64, m: f64) -> f64 {
    TAU * (uvw.u * l + uvw.v * m + uvw.w * n_minus_one(l, m))
}

/// Convert [`UVW`] coordinates in metres to wavelengths at `freq_hz`.
#[inline]
pub(crate) fn uvw_in_wavelengths(uvw: UVW, freq_hz: f64) -> UVW {
    uvw * freq_hz / VEL_C
}

/// The number of cross-correlation baselines for `num_antennas`.
#[inline]
pub(crate) fn num_cross_baselines(num_antennas: usize) -> usize {
    (num_antennas * (num_antennas - 1)) / 2
}

/// The antenna pairs of all cross-correlation baselines, ordered (0, 1),
/// (0, 2), ..., (1, 2), ...
pub(crate) fn cross_baseline_antenna_pairs(num_antennas: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(num_cross_baselines(num_antennas));
    for ant1 in 0..num_antennas {
        for ant2 in ant1 + 1..num_antennas {
            pairs.push((ant1, ant2));
        }
    }
    pairs
}
