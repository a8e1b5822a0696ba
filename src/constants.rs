// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. Imaging and calibration should be
done in double precision throughout.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

pub use marlu::constants::VEL_C;

/// The default imaging context.
pub const DEFAULT_CONTEXT: &str = "2d";

/// The default number of facets along each image axis.
pub const DEFAULT_FACETS: usize = 1;

/// The default number of visibility slices.
pub const DEFAULT_VIS_SLICES: usize = 1;

/// The default maximum number of CLEAN iterations per image plane.
pub const DEFAULT_CLEAN_NITER: usize = 1000;

/// The default CLEAN loop gain.
pub const DEFAULT_CLEAN_GAIN: f64 = 0.1;

/// The default absolute CLEAN threshold \[Jy\].
pub const DEFAULT_CLEAN_THRESHOLD: f64 = 0.0;

/// The default CLEAN threshold relative to the initial peak of each plane.
pub const DEFAULT_CLEAN_FRACTIONAL_THRESHOLD: f64 = 0.1;

/// The default maximum number of iterations allowed during calibration.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// The default threshold to satisfy convergence during calibration.
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-8;

/// The default minimum threshold to satisfy convergence during calibration.
/// Even when the "stop threshold" is not met, this threshold can still be
/// used to call a chanblock solution "converged".
pub const DEFAULT_MIN_THRESHOLD: f64 = 1e-4;

/// More than this many antennas must have solutions for a calibration
/// solution to be considered good.
pub const MIN_NUM_SOLVABLE_ANTENNAS: usize = 4;

/// The default number of major cycles.
pub const DEFAULT_NMAJOR: usize = 3;

/// Sidereal rotation rate of the Earth \[radians per second\].
pub const SIDEREAL_RATE: f64 = TAU / 86164.0905;
