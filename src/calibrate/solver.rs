// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The antenna-based gain solver.

use marlu::Jones;
use ndarray::prelude::*;
use serde::Serialize;

use crate::{constants::MIN_NUM_SOLVABLE_ANTENNAS, vis::Visibility};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub num_iterations: u32,
    pub converged: bool,
    pub max_precision: f64,
    pub num_failed: usize,
}

impl CalibrationResult {
    /// A human-readable convergence summary of a solution.
    pub(super) fn status(
        &self,
        num_antennas: usize,
        stop_threshold: f64,
        min_threshold: f64,
    ) -> String {
        if num_antennas - self.num_failed <= MIN_NUM_SOLVABLE_ANTENNAS {
            format!(
                "failed    ({:>2}): Too many antenna solutions failed ({})",
                self.num_iterations, self.num_failed
            )
        } else if self.max_precision > min_threshold {
            format!(
                "failed    ({:>2}): {:.5e} > {:e}",
                self.num_iterations, self.max_precision, min_threshold,
            )
        } else if self.max_precision > stop_threshold {
            format!(
                "converged ({:>2}): {:e} > {:.5e} > {:e}",
                self.num_iterations, min_threshold, self.max_precision, stop_threshold
            )
        } else {
            format!(
                "converged ({:>2}): {:e} > {:.5e}",
                self.num_iterations, stop_threshold, self.max_precision
            )
        }
    }
}

/// Solve for the gains of each antenna by comparing the `rows` of `vis`
/// against the same rows of `model`. `gains` holds the initial guess, and is
/// overwritten with the solutions. Return information on this process in a
/// [`CalibrationResult`].
///
/// This function is intended to be run in parallel; for that reason, no
/// parallel code is inside this function.
pub(super) fn calibrate(
    vis: &Visibility,
    model: &Visibility,
    rows: &[usize],
    mut gains: ArrayViewMut1<Jones<f64>>,
    max_iterations: u32,
    stop_threshold: f64,
    min_threshold: f64,
) -> CalibrationResult {
    assert_eq!(vis.len(), model.len());
    let num_antennas = gains.len_of(Axis(0));

    let mut old_gains: Array1<Jones<f64>> = Array::zeros(gains.dim());
    let mut top: Array1<Jones<f64>> = Array::zeros(gains.dim());
    let mut bot: Array1<Jones<f64>> = Array::zeros(gains.dim());
    // The convergence precisions per antenna, stored per polarisation. Only
    // the largest value is interesting.
    let mut precisions: Array2<f64> = Array::zeros((num_antennas, 4));
    let mut failed: Array1<bool> = Array1::from_elem(num_antennas, false);

    let mut iteration = 0;
    while iteration < max_iterations {
        iteration += 1;
        top.fill(Jones::default());
        bot.fill(Jones::default());

        calibration_loop(vis, model, rows, gains.view(), top.view_mut(), bot.view_mut());

        // Do a once-off check to see if `top` and `bot` are already identical.
        // This occurs on solutions without any data, or with a perfect model.
        if iteration == 1 {
            let top_and_bot_are_equal = top.iter().zip(bot.iter()).all(|(top, bot)| {
                (*top - bot)
                    .to_float_array()
                    .iter()
                    .all(|d| d.abs() <= stop_threshold)
            });
            if top_and_bot_are_equal {
                let top_and_bot_are_zeros = top
                    .iter()
                    .chain(bot.iter())
                    .flat_map(|j| j.to_float_array())
                    .all(|v| v.abs() <= f64::EPSILON);
                // No data at all; every antenna fails.
                if top_and_bot_are_zeros {
                    failed.fill(true);
                }
                break;
            }
        }

        // Obtain the new gains from "top" and "bot".
        gains
            .iter_mut()
            .zip(old_gains.iter_mut())
            .zip(top.iter())
            .zip(bot.iter())
            .zip(failed.iter_mut())
            .filter(|(_, failed)| !**failed)
            .for_each(|((((gain, old_gain), top), bot), failed)| {
                let div = *top / bot;
                if div.any_nan() {
                    *failed = true;
                    *gain = Jones::default();
                    *old_gain = Jones::default();
                } else {
                    *gain = div;
                }
            });

        let num_failed = failed.iter().filter(|&&f| f).count();
        if num_antennas - num_failed <= MIN_NUM_SOLVABLE_ANTENNAS {
            break;
        }

        // On every even iteration, test for convergence and set the new gains
        // as the average of the last two. This speeds up convergence.
        if iteration % 2 == 0 {
            gains
                .iter_mut()
                .zip(old_gains.iter())
                .zip(precisions.outer_iter_mut())
                .zip(failed.iter())
                .filter(|(_, &failed)| !failed)
                .for_each(|(((gain, &old_gain), mut antenna_precision), _)| {
                    let diff = *gain - old_gain;
                    antenna_precision
                        .iter_mut()
                        .zip(diff.iter())
                        .for_each(|(a, d)| *a = d.norm_sqr());
                    *gain = (*gain + old_gain) * 0.5;
                });

            if precisions.iter().all(|&v| v < stop_threshold) {
                break;
            }
        }
        old_gains.assign(&gains);
    }

    gains
        .iter_mut()
        .zip(failed.iter())
        .filter(|(_, &failed)| failed)
        .for_each(|(gain, _)| *gain = Jones::nan());

    let max_precision: f64 = precisions
        .outer_iter()
        .zip(failed.iter())
        .filter(|(_, &failed)| !failed)
        .fold(f64::MIN, |acc, (antenna_precision, _)| {
            antenna_precision.iter().fold(acc, |acc, &p| acc.max(p))
        });

    let num_failed = failed.iter().filter(|&&f| f).count();
    // If too few antennas remain, or the minimum threshold was never
    // reached, the whole solution is bad.
    let converged = if num_antennas - num_failed <= MIN_NUM_SOLVABLE_ANTENNAS
        || max_precision > min_threshold
    {
        gains.fill(Jones::nan());
        false
    } else {
        true
    };

    CalibrationResult {
        num_iterations: iteration,
        converged,
        max_precision,
        num_failed,
    }
}

/// The next iteration of gains is determined by summing the numerator ("top")
/// and denominator ("bot") of each antenna separately ("MitchCal", equation 11
/// of Mitchell et al. 2008). Each row contributes according to its weight;
/// autocorrelations and flagged rows are ignored.
fn calibration_loop(
    vis: &Visibility,
    model: &Visibility,
    rows: &[usize],
    gains: ArrayView1<Jones<f64>>,
    mut top: ArrayViewMut1<Jones<f64>>,
    mut bot: ArrayViewMut1<Jones<f64>>,
) {
    #[allow(non_snake_case)]
    for &i_row in rows {
        let weight = vis.weight[i_row];
        let (ant1, ant2) = (vis.antenna1[i_row], vis.antenna2[i_row]);
        if weight <= 0.0 || ant1 == ant2 {
            continue;
        }
        let D = vis.vis[i_row];
        let M = model.vis[i_row];

        // Antenna 1: ( D G M^H ) / ( (M G^H) (M G^H)^H )
        {
            let Z = gains[ant2] * M.h();
            top[ant1] += D * Z * weight;
            bot[ant1] += Z.h() * Z * weight;
        }
        // Antenna 2: ( D^H G M ) / ( (G M)^H (G M) )
        {
            let Z = gains[ant1] * M;
            top[ant2] += D.h() * Z * weight;
            bot[ant2] += Z.h() * Z * weight;
        }
    }
}
