// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Antenna-based gain calibration.

Gains are solved per solution interval (a range of times) and, optionally, per
channel. Each (interval, channel) solution is independent, so they're solved in
parallel. Solutions that fail are retried with a starting point taken from
neighbouring solutions that converged.
 */

mod error;
mod solver;
#[cfg(test)]
mod tests;

pub use error::CalibrateError;
pub use solver::CalibrationResult;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use marlu::Jones;
use ndarray::{prelude::*, Zip};
use rayon::prelude::*;
use vec1::Vec1;

use crate::{params::CalibrateParams, vis::Visibility, PROGRESS_BARS};

/// Gain solutions.
#[derive(Debug, Clone)]
pub struct GainTable {
    /// The gains. The dimensions are solution interval, antenna and solved
    /// channel.
    pub gains: Array3<Jones<f64>>,

    /// The edges of the solution intervals \[seconds\]. There is one more edge
    /// than there are intervals. Times before the first or after the last edge
    /// use the nearest interval.
    pub interval_edges: Vec1<f64>,

    /// The channel indices that have their own solutions. If this is `None`,
    /// one solution applies to every channel.
    pub channels: Option<Vec<usize>>,

    /// Convergence information. The dimensions are solution interval and
    /// solved channel.
    pub results: Array2<CalibrationResult>,
}

impl GainTable {
    /// A table of identity gains.
    pub fn identity(
        interval_edges: Vec1<f64>,
        num_antennas: usize,
        channels: Option<Vec<usize>>,
    ) -> GainTable {
        let num_intervals = (interval_edges.len() - 1).max(1);
        let num_slots = channels.as_ref().map(|c| c.len()).unwrap_or(1);
        GainTable {
            gains: Array3::from_elem((num_intervals, num_antennas, num_slots), Jones::identity()),
            interval_edges,
            channels,
            results: Array2::from_elem(
                (num_intervals, num_slots),
                CalibrationResult {
                    num_iterations: 0,
                    converged: true,
                    max_precision: 0.0,
                    num_failed: 0,
                },
            ),
        }
    }

    pub fn num_intervals(&self) -> usize {
        self.gains.len_of(Axis(0))
    }

    pub fn num_antennas(&self) -> usize {
        self.gains.len_of(Axis(1))
    }

    /// The solution interval that `time` belongs to.
    pub fn interval_of(&self, time: f64) -> usize {
        let interior = &self.interval_edges[1..self.num_intervals()];
        interior.iter().filter(|&&edge| edge <= time).count()
    }

    /// The index into the channel axis of the gains for `channel`.
    pub fn channel_slot(&self, channel: usize) -> Option<usize> {
        match &self.channels {
            None => Some(0),
            Some(channels) => channels.iter().position(|&c| c == channel),
        }
    }

    /// The number of (interval, channel) solutions that converged.
    pub fn num_converged(&self) -> usize {
        self.results.iter().filter(|r| r.converged).count()
    }
}

/// The edges of the solution intervals covering `times`.
fn interval_edges(times: &[f64], solution_interval: Option<f64>) -> Result<Vec1<f64>, CalibrateError> {
    let (t_min, t_max) = match (times.first(), times.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(CalibrateError::NoData),
    };
    let mut edges = Vec1::new(t_min);
    match solution_interval {
        None => edges.push(t_max),
        Some(dt) if dt > 0.0 => {
            let num_intervals = ((t_max - t_min) / dt).floor() as usize + 1;
            for i in 1..=num_intervals {
                edges.push(t_min + i as f64 * dt);
            }
        }
        Some(dt) => return Err(CalibrateError::BadSolutionInterval(dt)),
    }
    Ok(edges)
}

/// Convenience function to make a progress bar while calibrating.
fn make_calibration_progress_bar(num_solutions: usize, message: String) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(num_solutions as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message(message)
}

/// Solve for antenna gains that take `model` to `vis`, i.e. `vis = G1 model
/// G2^H`. If `model` is `None`, the model is a unit point source at the phase
/// centre.
pub fn solve_gaintable(
    vis: &Visibility,
    model: Option<&Visibility>,
    params: &CalibrateParams,
) -> Result<GainTable, CalibrateError> {
    if vis.is_empty() {
        return Err(CalibrateError::NoData);
    }
    if let Some(&antenna) = vis
        .antenna1
        .iter()
        .chain(vis.antenna2.iter())
        .find(|&&a| a >= vis.num_antennas)
    {
        return Err(CalibrateError::AntennaOutOfRange {
            antenna,
            num_antennas: vis.num_antennas,
        });
    }
    let point_source;
    let model = match model {
        Some(model) => {
            if model.len() != vis.len() {
                return Err(CalibrateError::ModelRows {
                    vis: vis.len(),
                    model: model.len(),
                });
            }
            model
        }
        None => {
            let mut m = vis.clone();
            m.vis.fill(Jones::identity());
            point_source = m;
            &point_source
        }
    };

    let edges = interval_edges(&vis.unique_times(), params.solution_interval)?;
    let channels = params.per_channel.then(|| vis.unique_channels());
    let mut gain_table = GainTable::identity(edges, vis.num_antennas, channels);
    let (num_intervals, num_antennas, num_slots) = gain_table.gains.dim();

    // The rows belonging to each (interval, channel) solution.
    let mut rows: Array2<Vec<usize>> = Array2::from_elem((num_intervals, num_slots), vec![]);
    for i_row in 0..vis.len() {
        let i_interval = gain_table.interval_of(vis.time[i_row]);
        let i_slot = gain_table
            .channel_slot(vis.channel[i_row])
            .expect("every channel of vis has a slot");
        rows[(i_interval, i_slot)].push(i_row);
    }
    debug!(
        "Calibrating {num_antennas} antennas over {num_intervals} solution intervals and {num_slots} channel solutions"
    );

    for (i_interval, (interval_rows, mut interval_results)) in rows
        .outer_iter()
        .zip(gain_table.results.outer_iter_mut())
        .enumerate()
    {
        let mut gains_rev = gain_table
            .gains
            .slice_mut(s![i_interval, .., ..])
            .reversed_axes();
        let progress_bar = make_calibration_progress_bar(
            num_slots,
            format!("Solving interval {}/{num_intervals}", i_interval + 1),
        );

        interval_results
            .as_slice_mut()
            .expect("is contiguous")
            .par_iter_mut()
            .zip(gains_rev.outer_iter_mut().into_par_iter())
            .zip(interval_rows.as_slice().expect("is contiguous").par_iter())
            .for_each(|((result, gains), rows)| {
                *result = solver::calibrate(
                    vis,
                    model,
                    rows,
                    gains,
                    params.max_iterations,
                    params.stop_threshold,
                    params.min_threshold,
                );
                progress_bar.inc(1);
            });

        retry_failed_solutions(
            vis,
            model,
            interval_rows.as_slice().expect("is contiguous"),
            gains_rev.view_mut(),
            interval_results.as_slice_mut().expect("is contiguous"),
            params,
        );
        progress_bar.abandon();

        for (i_slot, result) in interval_results.iter().enumerate() {
            let label = match &gain_table.channels {
                Some(channels) => format!("Channel {:>3}", channels[i_slot]),
                None => "All channels".to_string(),
            };
            let status = result.status(num_antennas, params.stop_threshold, params.min_threshold);
            if result.converged {
                debug!("Interval {i_interval} {label}: {status}");
            } else {
                warn!("Interval {i_interval} {label}: {status}");
            }
        }
    }

    info!(
        "{}/{} calibration solutions converged",
        gain_table.num_converged(),
        gain_table.results.len()
    );
    Ok(gain_table)
}

/// Attempt to solve any channels that failed by taking solutions from
/// neighbouring channels as starting points. Repeat while this makes progress.
fn retry_failed_solutions(
    vis: &Visibility,
    model: &Visibility,
    rows: &[Vec<usize>],
    mut gains_rev: ArrayViewMut2<Jones<f64>>,
    results: &mut [CalibrationResult],
    params: &CalibrateParams,
) {
    let num_slots = results.len();
    let mut total_converged_count = results.iter().filter(|r| r.converged).count();
    let mut new_converged_count = 1;
    let mut retry_iter = 0;
    while new_converged_count > 0 && total_converged_count > 0 && total_converged_count != num_slots {
        retry_iter += 1;
        debug!("Re-calibrating failed channels, iteration {retry_iter}");

        // Find each run of failures and the converged solutions on either
        // side. Guess the failed gains by a weighted average of the
        // neighbours.
        let mut left = None;
        let mut pairs = vec![];
        let mut in_failures = false;
        for (i_slot, result) in results.iter().enumerate() {
            match (in_failures, result.converged) {
                (false, true) => left = Some(i_slot),
                (false, false) => in_failures = true,
                (true, true) => {
                    in_failures = false;
                    pairs.push((left, Some(i_slot)));
                    left = Some(i_slot);
                }
                (true, false) => (),
            }
        }
        if in_failures {
            pairs.push((left, None));
        }

        for pair in pairs {
            match pair {
                (Some(l), Some(r)) => {
                    let left_sol = gains_rev.slice(s![l, ..]).to_owned();
                    let right_sol = gains_rev.slice(s![r, ..]).to_owned();
                    for i in l + 1..r {
                        let left_weight = (r - i) as f64;
                        let right_weight = (i - l) as f64;
                        let weighted_sol =
                            (&left_sol * left_weight + &right_sol * right_weight) / (r - l) as f64;
                        gains_rev.slice_mut(s![i, ..]).assign(&weighted_sol);
                    }
                }
                (Some(l), None) => {
                    let left_sol = gains_rev.slice(s![l, ..]).to_owned();
                    gains_rev.slice_mut(s![l + 1..num_slots, ..]).assign(&left_sol);
                }
                (None, Some(r)) => {
                    let right_sol = gains_rev.slice(s![r, ..]).to_owned();
                    gains_rev.slice_mut(s![0..r, ..]).assign(&right_sol);
                }
                (None, None) => unreachable!(),
            }
        }

        results
            .par_iter_mut()
            .zip(gains_rev.outer_iter_mut().into_par_iter())
            .zip(rows.par_iter())
            .filter(|((result, _), _)| !result.converged)
            .for_each(|((result, gains), rows)| {
                *result = solver::calibrate(
                    vis,
                    model,
                    rows,
                    gains,
                    params.max_iterations,
                    params.stop_threshold,
                    params.min_threshold,
                );
            });

        let count = results.iter().filter(|r| r.converged).count();
        new_converged_count = count - total_converged_count;
        total_converged_count = count;
    }
}

/// Apply the gains in `gain_table` to a copy of `vis`: `G1 V G2^H`, or `G1^-1 V
/// G2^-H` if `inverse` is true. Rows using a NaN gain are flagged (zero
/// visibilities and weights).
pub fn apply_gaintable(
    vis: &Visibility,
    gain_table: &GainTable,
    inverse: bool,
) -> Result<Visibility, CalibrateError> {
    let num_antennas = gain_table.num_antennas();
    let lookups = (0..vis.len())
        .map(|i_row| {
            for antenna in [vis.antenna1[i_row], vis.antenna2[i_row]] {
                if antenna >= num_antennas {
                    return Err(CalibrateError::AntennaOutOfRange {
                        antenna,
                        num_antennas,
                    });
                }
            }
            let channel = vis.channel[i_row];
            let i_slot = gain_table
                .channel_slot(channel)
                .ok_or(CalibrateError::UnsolvedChannel(channel))?;
            Ok((gain_table.interval_of(vis.time[i_row]), i_slot))
        })
        .collect::<Result<Array1<_>, _>>()?;

    let gains = &gain_table.gains;
    let mut out = vis.clone();
    Zip::from(&mut out.vis)
        .and(&mut out.weight)
        .and(&mut out.imaging_weight)
        .and(&vis.antenna1)
        .and(&vis.antenna2)
        .and(&lookups)
        .par_for_each(|v, weight, imaging_weight, &ant1, &ant2, &(i_interval, i_slot)| {
            let g1 = gains[(i_interval, ant1, i_slot)];
            let g2 = gains[(i_interval, ant2, i_slot)];
            if g1.any_nan() || g2.any_nan() {
                *v = Jones::default();
                *weight = 0.0;
                *imaging_weight = 0.0;
            } else if inverse {
                *v = g1.inv() * *v * g2.inv().h();
            } else {
                *v = g1 * *v * g2.h();
            }
        });
    Ok(out)
}
