// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::Jones;
use vec1::vec1;

use super::*;
use crate::{
    imaging::predict_2d,
    params::{PointSource, SimulationParams},
    simulate::{antenna_gains, simulate_observation},
};

/// Corrupted visibilities of the first simulated dataset, and the uncorrupted
/// model.
fn get_vis(params: SimulationParams) -> (Visibility, Visibility) {
    let obs = simulate_observation(&params).unwrap();
    let vis = obs.blocks[0].coalesce();
    let model = predict_2d(&vis, &obs.sky).unwrap();
    (vis, model)
}

fn corrupted() -> SimulationParams {
    SimulationParams {
        gain_amplitude_error: 0.1,
        gain_phase_error: 0.3,
        ..Default::default()
    }
}

fn strict() -> CalibrateParams {
    CalibrateParams {
        max_iterations: 200,
        stop_threshold: 1e-14,
        min_threshold: 1e-10,
        ..Default::default()
    }
}

#[test]
fn test_interval_edges() {
    let times = [0.0, 600.0, 1200.0, 1800.0];
    assert_eq!(
        interval_edges(&times, None).unwrap().as_slice(),
        &[0.0, 1800.0]
    );
    assert_eq!(
        interval_edges(&times, Some(1000.0)).unwrap().as_slice(),
        &[0.0, 1000.0, 2000.0]
    );
    assert_eq!(
        interval_edges(&times, Some(600.0)).unwrap().len(),
        5
    );
    assert!(matches!(
        interval_edges(&times, Some(0.0)),
        Err(CalibrateError::BadSolutionInterval(_))
    ));
    assert!(matches!(
        interval_edges(&[], None),
        Err(CalibrateError::NoData)
    ));
}

#[test]
fn test_gain_table_lookups() {
    let gain_table = GainTable::identity(vec1![0.0, 1000.0, 2000.0], 3, Some(vec![4, 7]));
    assert_eq!(gain_table.gains.dim(), (2, 3, 2));
    assert_eq!(gain_table.interval_of(-5.0), 0);
    assert_eq!(gain_table.interval_of(999.0), 0);
    assert_eq!(gain_table.interval_of(1000.0), 1);
    assert_eq!(gain_table.interval_of(5000.0), 1);
    assert_eq!(gain_table.channel_slot(7), Some(1));
    assert_eq!(gain_table.channel_slot(5), None);
    assert_eq!(gain_table.num_converged(), 4);

    let gain_table = GainTable::identity(vec1![0.0, 0.0], 3, None);
    assert_eq!(gain_table.interval_of(1e6), 0);
    assert_eq!(gain_table.channel_slot(123), Some(0));
}

#[test]
fn test_perfect_model_gives_unit_gains() {
    let (_, model) = get_vis(SimulationParams::default());
    let gain_table = solve_gaintable(&model, Some(&model), &CalibrateParams::default()).unwrap();
    assert_eq!(gain_table.num_intervals(), 1);
    assert_eq!(gain_table.num_converged(), 1);
    assert_eq!(gain_table.results[(0, 0)].num_iterations, 1);
    for g in gain_table.gains.iter() {
        assert_abs_diff_eq!(*g, Jones::identity());
    }

    let applied = apply_gaintable(&model, &gain_table, true).unwrap();
    assert_abs_diff_eq!(applied.vis, model.vis);
    assert_abs_diff_eq!(applied.weight, model.weight);
}

#[test]
fn test_solve_corrupted_gains() {
    let (vis, model) = get_vis(corrupted());
    let gain_table = solve_gaintable(&vis, Some(&model), &strict()).unwrap();
    let result = &gain_table.results[(0, 0)];
    assert!(result.converged, "{result:?}");
    assert_eq!(result.num_failed, 0);

    // Solutions are only unique up to a phase, but correcting the data must
    // recover the model.
    let corrected = apply_gaintable(&vis, &gain_table, true).unwrap();
    for (c, m) in corrected.vis.iter().zip(model.vis.iter()) {
        assert_abs_diff_eq!(*c, *m, epsilon = 1e-5);
    }
    // And corrupting the model must give the data.
    let corrupted = apply_gaintable(&model, &gain_table, false).unwrap();
    for (c, v) in corrupted.vis.iter().zip(vis.vis.iter()) {
        assert_abs_diff_eq!(*c, *v, epsilon = 1e-5);
    }
}

#[test]
fn test_solve_against_point_source() {
    let (vis, _) = get_vis(SimulationParams {
        sources: vec![PointSource {
            x: 0,
            y: 0,
            flux_density: 1.0,
        }],
        ..corrupted()
    });
    let gain_table = solve_gaintable(&vis, None, &strict()).unwrap();
    assert_eq!(gain_table.num_converged(), 1);
    let corrected = apply_gaintable(&vis, &gain_table, true).unwrap();
    for c in corrected.vis.iter() {
        assert_abs_diff_eq!(*c, Jones::identity(), epsilon = 1e-5);
    }
}

#[test]
fn test_solution_intervals_and_channels() {
    let (vis, model) = get_vis(SimulationParams {
        num_chans_per_dataset: 2,
        ..corrupted()
    });
    let params = CalibrateParams {
        solution_interval: Some(1000.0),
        per_channel: true,
        ..strict()
    };
    let gain_table = solve_gaintable(&vis, Some(&model), &params).unwrap();
    assert_eq!(gain_table.gains.dim(), (2, 8, 2));
    assert_eq!(gain_table.channels, Some(vec![0, 1]));
    assert_eq!(gain_table.num_converged(), 4);

    let corrected = apply_gaintable(&vis, &gain_table, true).unwrap();
    for (c, m) in corrected.vis.iter().zip(model.vis.iter()) {
        assert_abs_diff_eq!(*c, *m, epsilon = 1e-5);
    }

    let mut other = vis.clone();
    other.channel.fill(5);
    assert!(matches!(
        apply_gaintable(&other, &gain_table, true),
        Err(CalibrateError::UnsolvedChannel(5))
    ));
}

#[test]
fn test_too_few_antennas_fails() {
    let (vis, model) = get_vis(SimulationParams {
        num_antennas: 4,
        ..Default::default()
    });
    let gain_table = solve_gaintable(&vis, Some(&model), &CalibrateParams::default()).unwrap();
    assert_eq!(gain_table.num_converged(), 0);
    assert!(gain_table.gains.iter().all(|g| g.any_nan()));

    // Everything is flagged.
    let applied = apply_gaintable(&vis, &gain_table, true).unwrap();
    assert!(applied.weight.iter().all(|&w| w == 0.0));
    applied
        .vis
        .iter()
        .for_each(|v| assert_abs_diff_eq!(*v, Jones::default()));
}

#[test]
fn test_nan_gains_flag_rows() {
    let (vis, _) = get_vis(SimulationParams::default());
    let mut gain_table = GainTable::identity(vec1![0.0, 1800.0], 8, None);
    gain_table.gains[(0, 3, 0)] = Jones::nan();
    let applied = apply_gaintable(&vis, &gain_table, false).unwrap();
    for i_row in 0..vis.len() {
        if vis.antenna1[i_row] == 3 || vis.antenna2[i_row] == 3 {
            assert_eq!(applied.weight[i_row], 0.0);
            assert_eq!(applied.imaging_weight[i_row], 0.0);
            assert_abs_diff_eq!(applied.vis[i_row], Jones::default());
        } else {
            assert_eq!(applied.weight[i_row], vis.weight[i_row]);
            assert_abs_diff_eq!(applied.vis[i_row], vis.vis[i_row]);
        }
    }
}

#[test]
fn test_apply_round_trip() {
    let (vis, _) = get_vis(SimulationParams::default());
    let mut gain_table = GainTable::identity(vec1![0.0, 1800.0], 8, None);
    for (mut g, gain) in gain_table
        .gains
        .outer_iter_mut()
        .next()
        .unwrap()
        .outer_iter_mut()
        .zip(antenna_gains(8, 0.2, 0.5))
    {
        g.fill(gain);
    }
    let corrupted = apply_gaintable(&vis, &gain_table, false).unwrap();
    let restored = apply_gaintable(&corrupted, &gain_table, true).unwrap();
    for (r, v) in restored.vis.iter().zip(vis.vis.iter()) {
        assert_abs_diff_eq!(*r, *v, epsilon = 1e-12);
    }
}

#[test]
fn test_calibrate_errors() {
    let (vis, model) = get_vis(SimulationParams::default());
    let short = vis.select_rows(&[0, 1, 2]);
    assert!(matches!(
        solve_gaintable(&vis, Some(&short), &CalibrateParams::default()),
        Err(CalibrateError::ModelRows { model: 3, .. })
    ));

    let params = CalibrateParams {
        solution_interval: Some(-1.0),
        ..Default::default()
    };
    assert!(matches!(
        solve_gaintable(&vis, Some(&model), &params),
        Err(CalibrateError::BadSolutionInterval(_))
    ));

    let gain_table = GainTable::identity(vec1![0.0, 1800.0], 4, None);
    assert!(matches!(
        apply_gaintable(&vis, &gain_table, true),
        Err(CalibrateError::AntennaOutOfRange {
            num_antennas: 4,
            ..
        })
    ));

    let mut bad_antenna = vis.clone();
    bad_antenna.antenna2[0] = vis.num_antennas;
    assert!(matches!(
        solve_gaintable(&bad_antenna, Some(&model), &CalibrateParams::default()),
        Err(CalibrateError::AntennaOutOfRange { antenna, num_antennas })
            if antenna == vis.num_antennas && num_antennas == vis.num_antennas
    ));
}
