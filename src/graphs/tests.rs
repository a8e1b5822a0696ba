// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use marlu::{c64, Jones};
use ndarray::prelude::*;

use super::*;
use crate::{
    context::{ContextError, ImagingContext},
    error::ImagingError,
    graph::{compute, compute_list, GraphError, LocalEngine},
    image::ImagePolarisation,
    params::{CalibrateParams, DeconvolveMode, DeconvolveParams, SimulationParams, Weighting},
    partition::{scatter_image, ImagePartition, PartitionError},
    primitives::CpuPrimitives,
    simulate::{simulate_observation, SimulatedObservation},
    vis::VisError,
};

fn engine() -> LocalEngine {
    LocalEngine::new(4).unwrap()
}

fn builder(context: ImagingContext, facets: usize, vis_slices: usize) -> GraphBuilder {
    GraphBuilder::new(
        ImagingParams {
            context,
            facets,
            vis_slices,
            normalize: true,
        },
        Arc::new(CpuPrimitives),
    )
    .unwrap()
}

/// A simulated observation, its datasets as plans, and plans of its template
/// and true sky.
fn get_obs(
    params: &SimulationParams,
) -> (
    SimulatedObservation,
    Vec<Plan<MaybeVis>>,
    Plan<MaybeImage>,
    Plan<MaybeImage>,
) {
    let obs = simulate_observation(params).unwrap();
    let vis = obs
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| Plan::value(format!("vis{i}"), Some(b.coalesce())))
        .collect();
    let template = Plan::value("template", Some(obs.template.clone()));
    let sky = Plan::value("sky", Some(obs.sky.clone()));
    (obs, vis, template, sky)
}

fn get_image(values: &[f64], weight: f64) -> InvertResult {
    let mut image = Image::zeros(
        1,
        values.len(),
        0.01,
        marlu::RADec::from_degrees(0.0, -27.0),
        vec![150e6],
        ImagePolarisation::StokesI,
    );
    image
        .data
        .slice_mut(s![0, 0, 0, ..])
        .assign(&ArrayView1::from(values));
    (image, array![[weight]])
}

#[test]
fn test_sum_invert_results_is_weighted() {
    let a = get_image(&[2.0, 4.0], 1.0);
    let b = get_image(&[4.0, 0.0], 3.0);
    let (image, sumwt) = sum_invert_results(&[Some(&a), None, Some(&b)]).unwrap();
    assert_abs_diff_eq!(sumwt, array![[4.0]]);
    assert_abs_diff_eq!(
        image.data.slice(s![0, 0, 0, ..]),
        array![(2.0 + 12.0) / 4.0, 4.0 / 4.0]
    );

    assert!(matches!(
        sum_invert_results(&[None, None]),
        Err(ReduceError::NoInvertResults)
    ));
    assert!(matches!(
        sum_invert_ignore_none(&[None, None]),
        Ok(None)
    ));
}

#[test]
fn test_sum_invert_results_zero_weight() {
    let a = get_image(&[0.0, 0.0], 0.0);
    let b = get_image(&[0.0, 0.0], 0.0);
    let (image, sumwt) = sum_invert_results(&[Some(&a), Some(&b)]).unwrap();
    assert_abs_diff_eq!(sumwt, array![[0.0]]);
    assert!(image.data.iter().all(|v| *v == 0.0));
}

#[test]
fn test_sum_invert_results_shape_mismatch() {
    let a = get_image(&[1.0, 1.0], 1.0);
    let b = get_image(&[1.0, 1.0, 1.0], 1.0);
    assert!(matches!(
        sum_invert_results(&[Some(&a), Some(&b)]),
        Err(ReduceError::Image(_))
    ));
}

#[test]
fn test_unnormalise() {
    let a = get_image(&[2.0, -1.0], 3.0);
    let (image, sumwt) = unnormalise(&a);
    assert_abs_diff_eq!(sumwt, array![[3.0]]);
    assert_abs_diff_eq!(image.data.slice(s![0, 0, 0, ..]), array![6.0, -3.0]);

    // Planes with no weight were never normalised.
    let a = get_image(&[2.0, -1.0], 0.0);
    let (image, _) = unnormalise(&a);
    assert_abs_diff_eq!(image.data.slice(s![0, 0, 0, ..]), array![2.0, -1.0]);
}

#[test]
fn test_sum_predict_results() {
    let (obs, _, _, _) = get_obs(&SimulationParams::default());
    let vis = obs.blocks[0].coalesce();
    let sum = sum_predict_results(&[None, Some(&vis), Some(&vis)])
        .unwrap()
        .unwrap();
    for (s, v) in sum.vis.iter().zip(vis.vis.iter()) {
        assert_abs_diff_eq!(*s, *v * 2.0);
    }
    // Everything else comes from the first present entry.
    assert_abs_diff_eq!(sum.weight, vis.weight);

    assert!(sum_predict_results(&[None, None]).unwrap().is_none());

    let fewer = vis.select_rows(&[0, 1, 2]);
    assert!(matches!(
        sum_predict_results(&[Some(&vis), Some(&fewer)]),
        Err(ReduceError::Vis(VisError::ShapeMismatch { .. }))
    ));
}

#[test]
fn test_adapters_with_missing_data() {
    let (obs, _, _, _) = get_obs(&SimulationParams::default());
    let prims = CpuPrimitives;
    let vis = obs.blocks[0].coalesce();

    assert!(invert_ignore_none(&prims, Some(&vis), None, false)
        .unwrap()
        .is_none());
    let (image, sumwt) = invert_ignore_none(&prims, None, Some(&obs.template), false)
        .unwrap()
        .unwrap();
    assert_eq!(image.shape(), obs.template.shape());
    assert!(image.data.iter().all(|v| *v == 0.0));
    assert_abs_diff_eq!(sumwt, Array2::<f64>::zeros((1, 1)));

    assert!(predict_ignore_none(&prims, None, Some(&obs.sky))
        .unwrap()
        .is_none());
    assert!(predict_ignore_none(&prims, Some(&vis), None)
        .unwrap()
        .is_none());
    assert!(weight_ignore_none(&prims, Some(&vis), None, Weighting::Uniform)
        .unwrap()
        .is_none());

    let params = DeconvolveParams::default();
    assert!(deconvolve_ignore_none(&prims, None, None, None, &params)
        .unwrap()
        .is_none());
    let unchanged = deconvolve_ignore_none(&prims, None, Some(&obs.sky), Some(&obs.sky), &params)
        .unwrap()
        .unwrap();
    assert_abs_diff_eq!(unchanged.data, obs.sky.data);

    let calibrate_params = CalibrateParams::default();
    assert!(
        solve_ignore_none(&prims, Some(&vis), None, false, &calibrate_params)
            .unwrap()
            .is_none()
    );
    assert!(
        solve_ignore_none(&prims, Some(&vis), None, true, &calibrate_params)
            .unwrap()
            .is_some()
    );
    assert!(apply_ignore_none(&prims, Some(&vis), None, true)
        .unwrap()
        .is_none());
}

#[test]
fn test_construction_errors() {
    let result = GraphBuilder::new(
        ImagingParams {
            context: ImagingContext::TwoD,
            facets: 2,
            vis_slices: 1,
            normalize: true,
        },
        Arc::new(CpuPrimitives),
    );
    assert!(matches!(
        result,
        Err(BuildError::Context(ContextError::FacetsNotSupported { .. }))
    ));

    let builder = builder(ImagingContext::TwoD, 1, 1);
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    assert!(matches!(
        builder.subtract(&vis, &vis[..1]),
        Err(BuildError::LengthMismatch {
            vis: 2,
            got: 1,
            ..
        })
    ));

    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let params = DeconvolveParams {
        mode: DeconvolveMode::Facets(0),
        ..Default::default()
    };
    assert!(matches!(
        builder.deconvolve_with(&dirty, &psf, &template, &params),
        Err(BuildError::ZeroPartitions(_))
    ));
}

#[test]
fn test_inner_loops_agree() {
    let params = SimulationParams::default();
    let (_, vis, template, _) = get_obs(&params);

    let plans = [
        builder(ImagingContext::TwoD, 1, 1),
        builder(ImagingContext::Timeslice, 1, 2),
        builder(ImagingContext::FacetsTimeslice, 1, 2),
        builder(ImagingContext::Slice, 1, 3),
        builder(ImagingContext::Wstack, 1, 2),
    ]
    .iter()
    .map(|b| b.invert_sum(&vis, &template, false))
    .collect::<Vec<_>>();
    let results = compute_list(&engine(), &plans).unwrap();

    let (expected, expected_wt) = &results[0];
    assert!(expected.data.iter().any(|v| *v != 0.0));
    for (image, sumwt) in &results[1..] {
        assert_abs_diff_eq!(sumwt, expected_wt, epsilon = 1e-10);
        assert_abs_diff_eq!(image.data, expected.data, epsilon = 1e-10);
    }
}

#[test]
fn test_faceted_invert_matches_unfaceted() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let plans = [
        builder(ImagingContext::TwoD, 1, 1).invert_sum(&vis, &template, false),
        builder(ImagingContext::Facets, 2, 1).invert_sum(&vis, &template, false),
        builder(ImagingContext::FacetsWstack, 4, 2).invert_sum(&vis, &template, true),
        builder(ImagingContext::TwoD, 1, 1).invert_sum(&vis, &template, true),
    ];
    let results = compute_list(&engine(), &plans).unwrap();
    assert_abs_diff_eq!(results[1].0.data, results[0].0.data, epsilon = 1e-10);
    assert_abs_diff_eq!(results[1].1, results[0].1, epsilon = 1e-10);
    assert_abs_diff_eq!(results[2].0.data, results[3].0.data, epsilon = 1e-10);
    // The PSF peaks at 1 in the centre.
    assert_abs_diff_eq!(results[3].0.data[(0, 0, 16, 16)], 1.0, epsilon = 1e-10);
}

#[test]
fn test_invert_per_dataset() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::Timeslice, 1, 2);
    let per_dataset = builder.invert(&vis, &template, false);
    assert_eq!(per_dataset.len(), 2);
    let combined = builder.sum_invert(&per_dataset);

    let engine = engine();
    let parts = compute_list(&engine, &per_dataset).unwrap();
    let (image, sumwt) = compute(&engine, &combined).unwrap();
    let (a, wa) = parts[0].as_ref().unwrap();
    let (b, wb) = parts[1].as_ref().unwrap();
    let expected = (&a.data * wa[(0, 0)] + &b.data * wb[(0, 0)]) / (wa[(0, 0)] + wb[(0, 0)]);
    assert_abs_diff_eq!(image.data, expected, epsilon = 1e-12);
    assert_abs_diff_eq!(sumwt[(0, 0)], wa[(0, 0)] + wb[(0, 0)], epsilon = 1e-12);
}

#[test]
fn test_invert_with_missing_data() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::Timeslice, 1, 2);
    let missing_vis = Plan::value("missing_vis", None);
    let missing_image = Plan::value("missing_image", None);

    let engine = engine();
    let with_missing = builder.invert_sum(&[vis[0].clone(), missing_vis], &template, false);
    let alone = builder.invert_sum(&vis[..1], &template, false);
    let results = compute_list(&engine, &[with_missing, alone]).unwrap();
    assert_abs_diff_eq!(results[0].0.data, results[1].0.data, epsilon = 1e-12);
    assert_abs_diff_eq!(results[0].1, results[1].1, epsilon = 1e-12);

    // Without a template, there is nothing to sum.
    let no_template = builder.invert_sum(&vis, &missing_image, false);
    match compute(&engine, &no_template) {
        Err(GraphError::Task {
            source: ImagingError::Reduce(ReduceError::NoInvertResults),
            ..
        }) => (),
        _ => panic!("Expected no invert results"),
    }
}

#[test]
fn test_unnormalised_invert() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let normalised = builder(ImagingContext::Timeslice, 1, 2);
    let unnormalised = GraphBuilder::new(
        ImagingParams {
            normalize: false,
            ..normalised.params().clone()
        },
        normalised.primitives(),
    )
    .unwrap();

    let plans = [
        normalised.invert_sum(&vis, &template, false),
        unnormalised.invert_sum(&vis, &template, false),
    ];
    let results = compute_list(&engine(), &plans).unwrap();
    let (image, sumwt) = &results[0];
    assert!(sumwt[(0, 0)] > 0.0);
    assert_abs_diff_eq!(results[1].1, *sumwt);
    assert_abs_diff_eq!(results[1].0.data, &image.data * sumwt[(0, 0)], epsilon = 1e-8);
}

#[test]
fn test_zero_predict_subtract_is_zero() {
    let (_, vis, _, sky) = get_obs(&SimulationParams::default());
    for builder in [
        builder(ImagingContext::TwoD, 1, 1),
        builder(ImagingContext::FacetsTimeslice, 2, 2),
        builder(ImagingContext::Wstack, 1, 3),
    ] {
        let predicted = builder.predict(&builder.zero(&vis), &sky);
        let residual = builder.subtract(&vis, &predicted).unwrap();
        let results = compute_list(&engine(), &residual).unwrap();
        assert_eq!(results.len(), 2);
        for (result, v) in results.iter().zip(vis.iter()) {
            let result = result.as_ref().unwrap();
            let original = compute(&engine(), v).unwrap().unwrap();
            assert_eq!(result.len(), original.len());
            assert_abs_diff_eq!(result.weight, original.weight);
            for r in result.vis.iter() {
                assert_abs_diff_eq!(*r, Jones::default(), epsilon = 1e-10);
            }
        }
    }
}

#[test]
fn test_predict_restores_row_order() {
    let (_, vis, _, sky) = get_obs(&SimulationParams::default());
    let whole = builder(ImagingContext::TwoD, 1, 1).predict(&vis, &sky);
    let sliced = builder(ImagingContext::Timeslice, 1, 3).predict(&vis, &sky);
    let results = compute_list(&engine(), &[whole[1].clone(), sliced[1].clone()]).unwrap();
    let (whole, sliced) = (results[0].as_ref().unwrap(), results[1].as_ref().unwrap());
    assert_abs_diff_eq!(whole.time, sliced.time);
    for (w, s) in whole.vis.iter().zip(sliced.vis.iter()) {
        assert_abs_diff_eq!(*w, *s, epsilon = 1e-12);
    }

    // Without a model, nothing can be predicted.
    let missing = builder(ImagingContext::TwoD, 1, 1).predict(&vis, &Plan::value("missing", None));
    assert!(compute(&engine(), &missing[0]).unwrap().is_none());
}

#[test]
fn test_residual_of_true_sky() {
    let (_, vis, _, sky) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::Timeslice, 1, 2);
    let (image, sumwt) = compute(&engine(), &builder.residual_sum(&vis, &sky)).unwrap();
    assert!(sumwt[(0, 0)] > 0.0);
    assert_abs_diff_eq!(image.data, Array4::<f64>::zeros(image.data.dim()), epsilon = 1e-10);
}

#[test]
fn test_weight_graph() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let natural = builder.weight(&vis, &template, Weighting::Natural);
    let uniform = builder.weight(&vis, &template, Weighting::Uniform);
    let missing = builder.weight(&vis, &Plan::value("missing", None), Weighting::Uniform);

    let engine = engine();
    let natural = compute(&engine, &natural[0]).unwrap().unwrap();
    let uniform = compute(&engine, &uniform[0]).unwrap().unwrap();
    assert_abs_diff_eq!(natural.imaging_weight, natural.weight);
    assert!(uniform
        .imaging_weight
        .iter()
        .all(|&w| (0.0..=1.0).contains(&w)));
    assert!(compute(&engine, &missing[0]).unwrap().is_none());
}

#[test]
fn test_global_calibration_of_perfect_data() {
    let (_, vis, _, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let params = CalibrateParams::default();
    let gain_tables = builder.solve(&vis, &vis, &params).unwrap();
    assert_eq!(gain_tables.len(), 2);
    // A global solution is shared.
    assert_eq!(gain_tables[0].name(), gain_tables[1].name());
    let calibrated = builder.apply(&vis, &gain_tables, true).unwrap();

    let engine = engine();
    let gain_table = compute(&engine, &gain_tables[0]).unwrap().unwrap();
    for g in gain_table.gains.iter() {
        assert_abs_diff_eq!(*g, Jones::identity(), epsilon = 1e-10);
    }
    let calibrated = compute_list(&engine, &calibrated).unwrap();
    let originals = compute_list(&engine, &vis).unwrap();
    for (c, o) in calibrated.iter().zip(originals.iter()) {
        let (c, o) = (c.as_ref().unwrap(), o.as_ref().unwrap());
        for (c, o) in c.vis.iter().zip(o.vis.iter()) {
            assert_abs_diff_eq!(*c, *o, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_selfcal_corrects_gains() {
    let corrupted = SimulationParams {
        gain_amplitude_error: 0.1,
        gain_phase_error: 0.3,
        ..Default::default()
    };
    let (_, vis, _, sky) = get_obs(&corrupted);
    let (_, true_vis, _, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::Timeslice, 1, 2);

    for global_solution in [true, false] {
        let params = CalibrateParams {
            max_iterations: 200,
            stop_threshold: 1e-14,
            min_threshold: 1e-10,
            global_solution,
            ..Default::default()
        };
        let calibrated = builder.selfcal(&vis, &sky, &params).unwrap();
        let engine = engine();
        let calibrated = compute_list(&engine, &calibrated).unwrap();
        let expected = compute_list(&engine, &true_vis).unwrap();
        for (c, e) in calibrated.iter().zip(expected.iter()) {
            let (c, e) = (c.as_ref().unwrap(), e.as_ref().unwrap());
            for (c, e) in c.vis.iter().zip(e.vis.iter()) {
                assert_abs_diff_eq!(*c, *e, epsilon = 1e-5);
            }
        }
    }
}

#[test]
fn test_calibrate_with_missing_data() {
    let (_, vis, _, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let missing = Plan::value("missing", None);
    let model_vis = vec![vis[0].clone(), missing];
    for global_solution in [true, false] {
        let params = CalibrateParams {
            global_solution,
            ..Default::default()
        };
        let calibrated = builder.calibrate(&vis, &model_vis, &params).unwrap();
        let results = compute_list(&engine(), &calibrated).unwrap();
        assert!(results[0].is_some());
        // A local solution needs a model; a global one is shared.
        assert_eq!(results[1].is_some(), global_solution);
    }
}

#[test]
fn test_end_to_end() {
    let (obs, vis, template, _) = get_obs(&SimulationParams::default());
    assert_eq!(vis.len(), 2);
    let builder = builder(ImagingContext::Timeslice, 1, 2);
    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let model = builder.deconvolve(&dirty, &psf, &template, &DeconvolveParams::default());

    let model = compute(&engine(), &model).unwrap().unwrap();
    assert_eq!(model.shape(), obs.template.shape());
    assert!(model.total_flux() > 0.0);
}

#[test]
fn test_facet_deconvolution_matches_independent_facets() {
    let (obs, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let params = DeconvolveParams {
        niter: 50,
        mode: DeconvolveMode::Facets(2),
        ..Default::default()
    };
    let model = builder.deconvolve_with(&dirty, &psf, &template, &params).unwrap();

    let engine = engine();
    let model = compute(&engine, &model).unwrap().unwrap();
    let (dirty, _) = compute(&engine, &dirty).unwrap();
    let (psf, _) = compute(&engine, &psf).unwrap();
    assert_eq!(model.shape(), obs.template.shape());

    let prims = CpuPrimitives;
    let facets = scatter_image(&dirty, ImagePartition::Facets, 4).unwrap();
    for (i, facet) in facets.iter().enumerate() {
        let (components, _) = prims.deconvolve(facet, &psf, &params).unwrap();
        let (y, x) = (i / 2 * 16, i % 2 * 16);
        assert_abs_diff_eq!(
            model.data.slice(s![.., .., y..y + 16, x..x + 16]),
            components.data,
            epsilon = 1e-10
        );
    }
}

#[test]
fn test_facet_deconvolution_of_indivisible_image() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    // 32 pixels don't split into 3 facets, but that isn't known until the
    // dirty image exists.
    let model = builder
        .deconvolve_facets(&dirty, &psf, &template, &DeconvolveParams::default(), 3)
        .unwrap();
    match compute(&engine(), &model) {
        Err(GraphError::Task {
            source:
                ImagingError::Partition(PartitionError::FacetsDontDivide {
                    facets: 3,
                    ny: 32,
                    nx: 32,
                }),
            ..
        }) => (),
        _ => panic!("Expected the facets to not divide the image"),
    }
}

#[test]
fn test_channel_deconvolution_matches_independent_channels() {
    let params = SimulationParams {
        image_nchan: 2,
        ..Default::default()
    };
    let (obs, vis, template, _) = get_obs(&params);
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let params = DeconvolveParams {
        niter: 50,
        ..Default::default()
    };
    let model = builder
        .deconvolve_channels(&dirty, &psf, &template, &params, 2)
        .unwrap();

    let engine = engine();
    let model = compute(&engine, &model).unwrap().unwrap();
    let (dirty, _) = compute(&engine, &dirty).unwrap();
    let (psf, _) = compute(&engine, &psf).unwrap();
    assert_eq!(model.shape(), obs.template.shape());
    assert_eq!(model.num_chans(), 2);

    let prims = CpuPrimitives;
    let dirty_chans = scatter_image(&dirty, ImagePartition::Channels, 2).unwrap();
    let psf_chans = scatter_image(&psf, ImagePartition::Channels, 2).unwrap();
    for (i, (d, p)) in dirty_chans.iter().zip(psf_chans.iter()).enumerate() {
        let (components, _) = prims.deconvolve(d, p, &params).unwrap();
        assert_abs_diff_eq!(
            model.data.slice(s![i..i + 1, .., .., ..]),
            components.data,
            epsilon = 1e-10
        );
    }

    // Each channel is also what the whole-image deconvolution gives.
    let (whole, _) = prims.deconvolve(&dirty, &psf, &params).unwrap();
    assert_abs_diff_eq!(model.data, whole.data, epsilon = 1e-12);
}

#[test]
fn test_deconvolution_adds_to_model() {
    let (obs, vis, template, sky) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let params = DeconvolveParams::default();
    let from_template = builder.deconvolve(&dirty, &psf, &template, &params);
    let from_sky = builder.deconvolve(&dirty, &psf, &sky, &params);
    let from_nothing = builder.deconvolve(&dirty, &psf, &Plan::value("missing", None), &params);

    let results =
        compute_list(&engine(), &[from_template, from_sky, from_nothing]).unwrap();
    let (from_template, from_sky) = (results[0].as_ref().unwrap(), results[1].as_ref().unwrap());
    assert_abs_diff_eq!(
        from_sky.data,
        &from_template.data + &obs.sky.data,
        epsilon = 1e-12
    );
    assert!(results[2].is_none());
}

#[test]
fn test_continuum_imaging() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let builder = builder(ImagingContext::Timeslice, 1, 2);
    let params = DeconvolveParams::default();
    let dirty = builder.invert_sum(&vis, &template, false);
    let pipeline = builder
        .continuum_imaging(&vis, &template, &params, 2)
        .unwrap();

    let engine = engine();
    let (dirty, _) = compute(&engine, &dirty).unwrap();
    let model = compute(&engine, &pipeline.model).unwrap().unwrap();
    let (residual, _) = compute(&engine, &pipeline.residual).unwrap();
    let peak = |data: &Array4<f64>| data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    assert!(model.total_flux() > 0.0);
    assert!(peak(&residual.data) < 0.5 * peak(&dirty.data));
}

#[test]
fn test_continuum_imaging_ignores_unnormalised_inversion() {
    let (_, vis, template, _) = get_obs(&SimulationParams::default());
    let params = DeconvolveParams::default();
    let normalised = builder(ImagingContext::TwoD, 1, 1)
        .continuum_imaging(&vis, &template, &params, 2)
        .unwrap();
    let unnormalised = GraphBuilder::new(
        ImagingParams {
            context: ImagingContext::TwoD,
            facets: 1,
            vis_slices: 1,
            normalize: false,
        },
        Arc::new(CpuPrimitives),
    )
    .unwrap()
    .continuum_imaging(&vis, &template, &params, 2)
    .unwrap();

    let engine = engine();
    let model = compute(&engine, &normalised.model).unwrap().unwrap();
    let unnormalised_model = compute(&engine, &unnormalised.model).unwrap().unwrap();
    assert!(model.total_flux() > 0.0);
    assert_abs_diff_eq!(model.data, unnormalised_model.data, epsilon = 1e-8);

    let (residual, _) = compute(&engine, &normalised.residual).unwrap();
    let (unnormalised_residual, _) = compute(&engine, &unnormalised.residual).unwrap();
    assert_abs_diff_eq!(residual.data, unnormalised_residual.data, epsilon = 1e-8);
}

#[test]
fn test_ical() {
    let corrupted = SimulationParams {
        gain_amplitude_error: 0.05,
        gain_phase_error: 0.1,
        ..Default::default()
    };
    let (_, vis, template, _) = get_obs(&corrupted);
    let builder = builder(ImagingContext::TwoD, 1, 1);
    let pipeline = builder
        .ical(
            &vis,
            &template,
            &DeconvolveParams::default(),
            &CalibrateParams::default(),
            2,
            1,
        )
        .unwrap();
    assert_eq!(pipeline.vis.len(), 2);

    let engine = engine();
    let model = compute(&engine, &pipeline.model).unwrap().unwrap();
    assert!(model.total_flux() > 0.0);
    let calibrated = compute_list(&engine, &pipeline.vis).unwrap();
    for v in calibrated {
        let v = v.unwrap();
        assert!(v.vis.iter().all(|j| j.iter().all(|c: &c64| c.is_finite())));
    }
}
