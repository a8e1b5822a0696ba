// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic observations.
//!
//! Real telescope data is not read by this crate; instead, visibilities of a
//! point-source sky are simulated for a spiral array. Each dataset covers its
//! own block of channels, and the data can be corrupted with antenna gains.

mod error;

pub use error::SimulateError;

use log::debug;
use marlu::{c64, pos::xyz::xyzs_to_cross_uvws, Jones, RADec, XyzGeodetic, UVW};
use ndarray::prelude::*;

use crate::{
    constants::{SIDEREAL_RATE, TAU},
    image::{Image, ImagePolarisation},
    imaging::predict_2d,
    math::cross_baseline_antenna_pairs,
    params::SimulationParams,
    vis::BlockVisibility,
};

/// The golden angle \[radians\]. Antennas placed at successive multiples of it
/// never line up radially.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Everything made by [`simulate_observation`].
pub struct SimulatedObservation {
    /// One dataset per block of channels.
    pub blocks: Vec<BlockVisibility>,

    /// An empty image on which the observation can be imaged.
    pub template: Image,

    /// The true sky, on the grid of `template`.
    pub sky: Image,

    /// The gains applied to each antenna.
    pub gains: Vec<Jones<f64>>,
}

/// Antenna positions on a sunflower spiral, the outermost antenna at `radius`
/// \[metres\] from the array centre.
pub fn spiral_layout(num_antennas: usize, radius: f64, latitude_rad: f64) -> Vec<XyzGeodetic> {
    let (s_lat, c_lat) = latitude_rad.sin_cos();
    (0..num_antennas)
        .map(|i| {
            let r = radius * ((i + 1) as f64 / num_antennas as f64).sqrt();
            let (sin, cos) = (i as f64 * GOLDEN_ANGLE).sin_cos();
            let (e, n) = (r * cos, r * sin);
            // East-north-height to geodetic XYZ, with no height.
            XyzGeodetic {
                x: -n * s_lat,
                y: e,
                z: n * c_lat,
            }
        })
        .collect()
}

/// Deterministic antenna gains. With zero errors, every gain is the identity.
pub fn antenna_gains(num_antennas: usize, amplitude_error: f64, phase_error: f64) -> Vec<Jones<f64>> {
    (0..num_antennas)
        .map(|i| {
            let i = i as f64;
            let gx = c64::from_polar(
                1.0 + amplitude_error * (1.7 * i + 0.3).sin(),
                phase_error * (2.3 * i + 0.1).cos(),
            );
            let gy = c64::from_polar(
                1.0 + amplitude_error * (1.1 * i + 0.9).cos(),
                phase_error * (0.7 * i + 1.3).sin(),
            );
            Jones::from([gx, c64::default(), c64::default(), gy])
        })
        .collect()
}

/// The image template and true sky of an observation.
pub fn sky_model(params: &SimulationParams) -> Result<(Image, Image), SimulateError> {
    let total_chans = params.num_datasets * params.num_chans_per_dataset;
    let freqs = (0..total_chans)
        .map(|c| params.freq_start + c as f64 * params.freq_res)
        .collect::<Vec<_>>();
    let frequencies = match params.image_nchan {
        1 => vec![freqs.iter().sum::<f64>() / total_chans as f64],
        n if n == total_chans => freqs,
        got => {
            return Err(SimulateError::ImageChannels {
                got,
                total: total_chans,
            })
        }
    };

    let template = Image::zeros(
        params.npixel,
        params.npixel,
        params.cellsize,
        RADec::from_degrees(params.phase_centre_ra, params.phase_centre_dec),
        frequencies,
        params.polarisation,
    );

    let mut sky = template.empty_like();
    let centre = (params.npixel / 2) as i64;
    for source in &params.sources {
        let (x, y) = (centre + source.x, centre + source.y);
        if x < 0 || y < 0 || x >= params.npixel as i64 || y >= params.npixel as i64 {
            return Err(SimulateError::SourceOutsideImage {
                x: source.x,
                y: source.y,
                npixel: params.npixel,
            });
        }
        let (x, y) = (x as usize, y as usize);
        match params.polarisation {
            ImagePolarisation::StokesI => {
                sky.data
                    .slice_mut(s![.., 0, y, x])
                    .mapv_inplace(|v| v + source.flux_density);
            }
            ImagePolarisation::Linear => {
                for pol in [0, 3] {
                    sky.data
                        .slice_mut(s![.., pol, y, x])
                        .mapv_inplace(|v| v + source.flux_density);
                }
            }
        }
    }

    Ok((template, sky))
}

/// Simulate the visibilities of a point-source sky.
pub fn simulate_observation(params: &SimulationParams) -> Result<SimulatedObservation, SimulateError> {
    if params.num_antennas < 2 {
        return Err(SimulateError::TooFewAntennas(params.num_antennas));
    }
    for (value, what) in [
        (params.num_datasets, "datasets"),
        (params.num_times, "times"),
        (params.num_chans_per_dataset, "channels"),
        (params.npixel, "pixels"),
    ] {
        if value == 0 {
            return Err(SimulateError::Zero(what));
        }
    }

    let (template, sky) = sky_model(params)?;
    let phase_centre = template.grid.phase_centre;
    let xyzs = spiral_layout(
        params.num_antennas,
        params.array_radius,
        params.array_latitude.to_radians(),
    );
    let baselines = cross_baseline_antenna_pairs(params.num_antennas);
    let gains = antenna_gains(
        params.num_antennas,
        params.gain_amplitude_error,
        params.gain_phase_error,
    );

    // Centre the observation on transit.
    let times = (0..params.num_times)
        .map(|i| i as f64 * params.integration_time)
        .collect::<Vec<_>>();
    let mid_time = times[times.len() - 1] / 2.0;
    let mut uvw = Array2::from_elem(
        (times.len(), baselines.len()),
        UVW {
            u: 0.0,
            v: 0.0,
            w: 0.0,
        },
    );
    for (mut uvw_row, &time) in uvw.outer_iter_mut().zip(times.iter()) {
        let lst = (phase_centre.ra + (time - mid_time) * SIDEREAL_RATE).rem_euclid(TAU);
        let uvws = xyzs_to_cross_uvws(&xyzs, phase_centre.to_hadec(lst));
        uvw_row
            .iter_mut()
            .zip(uvws)
            .for_each(|(out, uvw)| *out = uvw);
    }

    let mut blocks = Vec::with_capacity(params.num_datasets);
    for i_dataset in 0..params.num_datasets {
        let first_channel = i_dataset * params.num_chans_per_dataset;
        let frequencies = (first_channel..first_channel + params.num_chans_per_dataset)
            .map(|c| params.freq_start + c as f64 * params.freq_res)
            .collect::<Vec<_>>();
        let shape = (times.len(), baselines.len(), frequencies.len());
        let mut block = BlockVisibility::new(
            Array3::zeros(shape),
            Array3::ones(shape),
            uvw.clone(),
            times.clone(),
            frequencies,
            baselines.clone(),
            phase_centre,
            params.num_antennas,
        )?
        .with_first_channel(first_channel);

        // Predict the sky in row form, then put it back into the block.
        let predicted = predict_2d(&block.coalesce(), &sky)?;
        block
            .vis
            .iter_mut()
            .zip(predicted.vis.iter())
            .for_each(|(v, p)| *v = *p);

        // Corrupt.
        for (mut vis_bf, &(ant1, ant2)) in block.vis.axis_iter_mut(Axis(1)).zip(baselines.iter()) {
            let (g1, g2) = (gains[ant1], gains[ant2]);
            vis_bf.mapv_inplace(|v| g1 * v * g2.h());
        }

        debug!(
            "Simulated dataset {i_dataset}: {} times, {} baselines, {} channels",
            shape.0, shape.1, shape.2
        );
        blocks.push(block);
    }

    Ok(SimulatedObservation {
        blocks,
        template,
        sky,
        gains,
    })
}
