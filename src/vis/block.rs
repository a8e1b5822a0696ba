// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use marlu::{Jones, RADec, UVW};
use ndarray::prelude::*;

use super::{VisError, Visibility};

/// Visibilities grouped by time, baseline and channel.
#[derive(Debug, Clone)]
pub struct BlockVisibility {
    /// Correlations. The first dimension is time, the second is baseline, the
    /// third is channel.
    pub vis: Array3<Jones<f64>>,

    /// Data weights, with the same shape as `vis`.
    pub weight: Array3<f64>,

    /// [`UVW`] coordinates \[metres\]. The first dimension is time, the second
    /// is baseline.
    pub uvw: Array2<UVW>,

    /// The time of each timestep \[seconds\].
    pub times: Vec<f64>,

    /// The frequency of each channel \[Hz\].
    pub frequencies: Vec<f64>,

    /// The antenna pair of each baseline.
    pub baselines: Vec<(usize, usize)>,

    /// The channel index of the first frequency. Datasets covering different
    /// parts of a band have different first channels.
    pub first_channel: usize,

    pub phase_centre: RADec,

    pub num_antennas: usize,
}

impl BlockVisibility {
    /// Create a new [`BlockVisibility`], checking that the arrays agree with
    /// the number of times, baselines and frequencies.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vis: Array3<Jones<f64>>,
        weight: Array3<f64>,
        uvw: Array2<UVW>,
        times: Vec<f64>,
        frequencies: Vec<f64>,
        baselines: Vec<(usize, usize)>,
        phase_centre: RADec,
        num_antennas: usize,
    ) -> Result<BlockVisibility, VisError> {
        let expected = vec![times.len(), baselines.len(), frequencies.len()];
        if vis.shape() != expected.as_slice() {
            return Err(VisError::BlockShape {
                array: "vis",
                expected,
                got: vis.shape().to_vec(),
            });
        }
        if weight.shape() != expected.as_slice() {
            return Err(VisError::BlockShape {
                array: "weight",
                expected,
                got: weight.shape().to_vec(),
            });
        }
        let expected = vec![times.len(), baselines.len()];
        if uvw.shape() != expected.as_slice() {
            return Err(VisError::BlockShape {
                array: "uvw",
                expected,
                got: uvw.shape().to_vec(),
            });
        }

        Ok(BlockVisibility {
            vis,
            weight,
            uvw,
            times,
            frequencies,
            baselines,
            first_channel: 0,
            phase_centre,
            num_antennas,
        })
    }

    pub fn with_first_channel(self, first_channel: usize) -> BlockVisibility {
        BlockVisibility {
            first_channel,
            ..self
        }
    }

    /// Convert to row form. Rows are ordered by time, then baseline, then
    /// channel.
    pub fn coalesce(&self) -> Visibility {
        let (num_times, num_baselines, num_chans) = self.vis.dim();
        let num_rows = num_times * num_baselines * num_chans;

        let mut uvw = Vec::with_capacity(num_rows);
        let mut time = Vec::with_capacity(num_rows);
        let mut frequency = Vec::with_capacity(num_rows);
        let mut channel = Vec::with_capacity(num_rows);
        let mut antenna1 = Vec::with_capacity(num_rows);
        let mut antenna2 = Vec::with_capacity(num_rows);
        for (i_time, &t) in self.times.iter().enumerate() {
            for (i_bl, &(ant1, ant2)) in self.baselines.iter().enumerate() {
                for (i_chan, &freq) in self.frequencies.iter().enumerate() {
                    uvw.push(self.uvw[(i_time, i_bl)]);
                    time.push(t);
                    frequency.push(freq);
                    channel.push(self.first_channel + i_chan);
                    antenna1.push(ant1);
                    antenna2.push(ant2);
                }
            }
        }

        // Iteration is in logical order, which matches the row order.
        let vis: Array1<Jones<f64>> = self.vis.iter().copied().collect();
        let weight: Array1<f64> = self.weight.iter().copied().collect();

        Visibility {
            imaging_weight: weight.clone(),
            vis,
            weight,
            uvw: Array1::from(uvw),
            time: Array1::from(time),
            frequency: Array1::from(frequency),
            channel: Array1::from(channel),
            antenna1: Array1::from(antenna1),
            antenna2: Array1::from(antenna2),
            phase_centre: self.phase_centre,
            num_antennas: self.num_antennas,
        }
    }
}
