// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility datasets.
//!
//! A [`Visibility`] is an ordered sequence of rows, each row being a single
//! baseline's correlations at a single time and channel. The row order is
//! significant; partitions of a dataset are described by row indices, and
//! writing partitions back must restore the original row positions.
//!
//! A [`BlockVisibility`] holds the same data grouped by (time, baseline,
//! channel). It must be coalesced into a [`Visibility`] before it can be
//! partitioned by rows.

mod block;
mod error;
mod operations;

pub use block::BlockVisibility;
pub use error::VisError;
pub use operations::{
    divide_visibility, gather_channels, integrate_by_channel, subtract_visibility,
};

use itertools::Itertools;
use marlu::{Jones, RADec, UVW};
use ndarray::prelude::*;

/// Visibilities in row form.
#[derive(Debug, Clone)]
pub struct Visibility {
    /// The correlations of each row (XX, XY, YX, YY).
    pub vis: Array1<Jones<f64>>,

    /// The data weight of each row.
    pub weight: Array1<f64>,

    /// The weight used when imaging each row. This is the data weight until a
    /// weighting scheme has been applied.
    pub imaging_weight: Array1<f64>,

    /// The [`UVW`] coordinates of each row \[metres\].
    pub uvw: Array1<UVW>,

    /// The time of each row \[seconds\].
    pub time: Array1<f64>,

    /// The frequency of each row \[Hz\].
    pub frequency: Array1<f64>,

    /// The channel index of each row.
    pub channel: Array1<usize>,

    /// The first antenna of each row's baseline.
    pub antenna1: Array1<usize>,

    /// The second antenna of each row's baseline.
    pub antenna2: Array1<usize>,

    /// The phase centre of the visibilities.
    pub phase_centre: RADec,

    /// The total number of antennas in the array.
    pub num_antennas: usize,
}

impl Visibility {
    /// Create a new [`Visibility`]. All per-row columns must have the same
    /// length. The imaging weights are initialised to the data weights.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vis: Array1<Jones<f64>>,
        weight: Array1<f64>,
        uvw: Array1<UVW>,
        time: Array1<f64>,
        frequency: Array1<f64>,
        channel: Array1<usize>,
        antenna1: Array1<usize>,
        antenna2: Array1<usize>,
        phase_centre: RADec,
        num_antennas: usize,
    ) -> Result<Visibility, VisError> {
        let expected = vis.len();
        for (column, got) in [
            ("weight", weight.len()),
            ("uvw", uvw.len()),
            ("time", time.len()),
            ("frequency", frequency.len()),
            ("channel", channel.len()),
            ("antenna1", antenna1.len()),
            ("antenna2", antenna2.len()),
        ] {
            if got != expected {
                return Err(VisError::ColumnLength {
                    column,
                    expected,
                    got,
                });
            }
        }

        Ok(Visibility {
            imaging_weight: weight.clone(),
            vis,
            weight,
            uvw,
            time,
            frequency,
            channel,
            antenna1,
            antenna2,
            phase_centre,
            num_antennas,
        })
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.vis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vis.is_empty()
    }

    /// Create a new [`Visibility`] from a subset of rows. The rows are kept in
    /// the order given.
    pub fn select_rows(&self, rows: &[usize]) -> Visibility {
        Visibility {
            vis: self.vis.select(Axis(0), rows),
            weight: self.weight.select(Axis(0), rows),
            imaging_weight: self.imaging_weight.select(Axis(0), rows),
            uvw: self.uvw.select(Axis(0), rows),
            time: self.time.select(Axis(0), rows),
            frequency: self.frequency.select(Axis(0), rows),
            channel: self.channel.select(Axis(0), rows),
            antenna1: self.antenna1.select(Axis(0), rows),
            antenna2: self.antenna2.select(Axis(0), rows),
            phase_centre: self.phase_centre,
            num_antennas: self.num_antennas,
        }
    }

    /// Write the correlations of `part` into the given rows of `self`. `part`
    /// must have been created with [`Visibility::select_rows`] with the same
    /// `rows`.
    pub fn assign_rows(&mut self, rows: &[usize], part: &Visibility) -> Result<(), VisError> {
        if rows.len() != part.len() {
            return Err(VisError::ShapeMismatch {
                left: rows.len(),
                right: part.len(),
            });
        }
        for (&row, &vis) in rows.iter().zip(part.vis.iter()) {
            self.vis[row] = vis;
        }
        Ok(())
    }

    /// A copy of these visibilities with all correlations set to zero.
    pub fn zeroed(&self) -> Visibility {
        let mut zero = self.clone();
        zero.vis.fill(Jones::default());
        zero
    }

    /// Return an error if `other` doesn't have the same number of rows.
    pub fn check_same_shape(&self, other: &Visibility) -> Result<(), VisError> {
        if self.len() != other.len() {
            return Err(VisError::ShapeMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(())
    }

    /// Add the correlations of `other` to `self`, row by row.
    pub fn add_assign_vis(&mut self, other: &Visibility) -> Result<(), VisError> {
        self.check_same_shape(other)?;
        self.vis
            .iter_mut()
            .zip(other.vis.iter())
            .for_each(|(v, o)| *v += *o);
        Ok(())
    }

    /// The distinct times of these visibilities in ascending order.
    pub fn unique_times(&self) -> Vec<f64> {
        self.time
            .iter()
            .copied()
            .sorted_by(|a, b| a.total_cmp(b))
            .dedup()
            .collect()
    }

    /// The distinct channel indices of these visibilities in ascending order.
    pub fn unique_channels(&self) -> Vec<usize> {
        self.channel.iter().copied().sorted().dedup().collect()
    }

    /// The sum of the data weights.
    pub fn sum_weights(&self) -> f64 {
        self.weight.sum()
    }
}
