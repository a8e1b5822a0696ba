// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Driving the library from the outside: simulate, build graphs, compute.

use std::sync::Arc;

use imaging_graphs::{
    compute_list, simulate::simulate_observation, CpuPrimitives, DeconvolveParams, GraphBuilder,
    ImagingContext, ImagingParams, LocalEngine, MaybeImage, Plan, SimulationParams,
};

#[test]
fn test_image_and_deconvolve_two_datasets() {
    let obs = simulate_observation(&SimulationParams::default()).unwrap();
    assert_eq!(obs.blocks.len(), 2);

    let builder = GraphBuilder::new(
        ImagingParams {
            context: ImagingContext::Slice,
            facets: 1,
            vis_slices: 2,
            normalize: true,
        },
        Arc::new(CpuPrimitives),
    )
    .unwrap();
    let blocks = obs
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| Plan::value(format!("block{i}"), Some(b.clone())))
        .collect::<Vec<_>>();
    let vis = builder.coalesce(&blocks);
    let template: Plan<MaybeImage> = Plan::value("template", Some(obs.template.clone()));

    let dirty = builder.invert_sum(&vis, &template, false);
    let psf = builder.invert_sum(&vis, &template, true);
    let model = builder.deconvolve(&dirty, &psf, &template, &DeconvolveParams::default());

    let engine = LocalEngine::new(4).unwrap();
    let results = compute_list(&engine, &[model]).unwrap();
    let model = results[0].as_ref().unwrap();
    assert!(model.total_flux() > 0.0);
    assert_eq!(model.shape(), obs.template.shape());
}
