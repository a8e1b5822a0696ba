// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Element-wise operations on visibilities.

use indexmap::IndexMap;
use itertools::Itertools;
use marlu::{c64, Jones, UVW};
use ndarray::prelude::*;

use super::{VisError, Visibility};

/// Subtract `model` from `vis`, row by row. The metadata of `vis` is kept.
pub fn subtract_visibility(vis: &Visibility, model: &Visibility) -> Result<Visibility, VisError> {
    vis.check_same_shape(model)?;
    let mut out = vis.clone();
    out.vis
        .iter_mut()
        .zip(model.vis.iter())
        .for_each(|(v, m)| *v -= *m);
    Ok(out)
}

/// Divide `vis` by `model` element by element. Where an element of the model
/// is zero, the ratio is zero. The weights are scaled by the mean squared
/// amplitude of the model's parallel-hand elements, so rows with no model
/// power carry no weight.
pub fn divide_visibility(vis: &Visibility, model: &Visibility) -> Result<Visibility, VisError> {
    vis.check_same_shape(model)?;
    let mut out = vis.clone();
    out.vis
        .iter_mut()
        .zip(out.weight.iter_mut())
        .zip(out.imaging_weight.iter_mut())
        .zip(model.vis.iter())
        .for_each(|(((v, w), iw), m)| {
            let mut ratio = [c64::default(); 4];
            for (i, r) in ratio.iter_mut().enumerate() {
                if m[i].norm_sqr() > 0.0 {
                    *r = v[i] / m[i];
                }
            }
            *v = Jones::from(ratio);

            let model_power = 0.5 * (m[0].norm_sqr() + m[3].norm_sqr());
            *w *= model_power;
            *iw *= model_power;
        });
    Ok(out)
}

/// Concatenate many visibility datasets into one. Channel indices are
/// renumbered by the sorted distinct frequencies of all inputs, so that rows at
/// the same frequency share a channel regardless of which dataset they came
/// from.
pub fn gather_channels(datasets: &[&Visibility]) -> Result<Visibility, VisError> {
    let first = datasets.first().ok_or(VisError::NothingToGather)?;

    let freqs: Vec<f64> = datasets
        .iter()
        .flat_map(|v| v.frequency.iter().copied())
        .sorted_by(|a, b| a.total_cmp(b))
        .dedup()
        .collect();
    let channel_of = |f: f64| -> usize {
        freqs
            .binary_search_by(|probe| probe.total_cmp(&f))
            .unwrap_or_else(|i| i)
    };

    fn concat<T: Copy>(datasets: &[&Visibility], column: fn(&Visibility) -> &Array1<T>) -> Array1<T> {
        datasets
            .iter()
            .flat_map(|v| column(v).iter().copied())
            .collect()
    }
    let frequency = concat(datasets, |v| &v.frequency);
    let channel = frequency.mapv(channel_of);
    let vis = concat(datasets, |v| &v.vis);
    let weight = concat(datasets, |v| &v.weight);
    let imaging_weight = concat(datasets, |v| &v.imaging_weight);
    let uvw = concat(datasets, |v| &v.uvw);
    let time = concat(datasets, |v| &v.time);
    let antenna1 = concat(datasets, |v| &v.antenna1);
    let antenna2 = concat(datasets, |v| &v.antenna2);
    let num_antennas = datasets
        .iter()
        .map(|v| v.num_antennas)
        .max()
        .unwrap_or(first.num_antennas);

    Ok(Visibility {
        vis,
        weight,
        imaging_weight,
        uvw,
        time,
        frequency,
        channel,
        antenna1,
        antenna2,
        phase_centre: first.phase_centre,
        num_antennas,
    })
}

/// Average the rows of `vis` over channels. One row is produced per distinct
/// (time, antenna1, antenna2), in order of first appearance. Each output row is
/// the weighted mean of its inputs; it is assigned channel 0 and the mean
/// frequency of its inputs.
pub fn integrate_by_channel(vis: &Visibility) -> Visibility {
    struct Acc {
        vis: Jones<f64>,
        weight: f64,
        imaging_weight: f64,
        freq_sum: f64,
        count: usize,
        uvw: UVW,
        time: f64,
    }

    let mut groups: IndexMap<(u64, usize, usize), Acc> = IndexMap::new();
    for i in 0..vis.len() {
        let key = (vis.time[i].to_bits(), vis.antenna1[i], vis.antenna2[i]);
        let acc = groups.entry(key).or_insert_with(|| Acc {
            vis: Jones::default(),
            weight: 0.0,
            imaging_weight: 0.0,
            freq_sum: 0.0,
            count: 0,
            uvw: vis.uvw[i],
            time: vis.time[i],
        });
        let w = vis.weight[i];
        acc.vis += vis.vis[i] * w;
        acc.weight += w;
        acc.imaging_weight += vis.imaging_weight[i];
        acc.freq_sum += vis.frequency[i];
        acc.count += 1;
    }

    let num_rows = groups.len();
    let mut out_vis = Vec::with_capacity(num_rows);
    let mut weight = Vec::with_capacity(num_rows);
    let mut imaging_weight = Vec::with_capacity(num_rows);
    let mut uvw = Vec::with_capacity(num_rows);
    let mut time = Vec::with_capacity(num_rows);
    let mut frequency = Vec::with_capacity(num_rows);
    let mut antenna1 = Vec::with_capacity(num_rows);
    let mut antenna2 = Vec::with_capacity(num_rows);
    for ((_, ant1, ant2), acc) in groups {
        out_vis.push(if acc.weight > 0.0 {
            acc.vis * (1.0 / acc.weight)
        } else {
            Jones::default()
        });
        weight.push(acc.weight);
        imaging_weight.push(acc.imaging_weight);
        uvw.push(acc.uvw);
        time.push(acc.time);
        frequency.push(acc.freq_sum / acc.count as f64);
        antenna1.push(ant1);
        antenna2.push(ant2);
    }

    Visibility {
        vis: Array1::from(out_vis),
        weight: Array1::from(weight),
        imaging_weight: Array1::from(imaging_weight),
        uvw: Array1::from(uvw),
        time: Array1::from(time),
        frequency: Array1::from(frequency),
        channel: Array1::zeros(num_rows),
        antenna1: Array1::from(antenna1),
        antenna2: Array1::from(antenna2),
        phase_centre: vis.phase_centre,
        num_antennas: vis.num_antennas,
    }
}
