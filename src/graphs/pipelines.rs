// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Major-cycle pipelines.

use log::debug;

use super::{BuildError, GraphBuilder, MaybeImage, MaybeVis};
use crate::{
    graph::Plan,
    image::InvertResult,
    params::{CalibrateParams, DeconvolveParams},
};

/// The plans of a continuum-imaging pipeline.
#[derive(Debug, Clone)]
pub struct ContinuumImaging {
    /// The model after the last major cycle.
    pub model: Plan<MaybeImage>,

    /// The residual image of the final model.
    pub residual: Plan<InvertResult>,

    pub psf: Plan<InvertResult>,
}

/// The plans of an ICAL pipeline.
#[derive(Debug, Clone)]
pub struct Ical {
    /// The model after the last major cycle.
    pub model: Plan<MaybeImage>,

    /// The residual image of the final model against the final calibrated
    /// visibilities.
    pub residual: Plan<InvertResult>,

    pub psf: Plan<InvertResult>,

    /// The visibilities calibrated against the final model. These are the
    /// input visibilities if self-calibration never happened.
    pub vis: Vec<Plan<MaybeVis>>,
}

impl GraphBuilder {
    /// `nmajor` major cycles of residual imaging and deconvolution, starting
    /// from `model`.
    pub fn continuum_imaging(
        &self,
        vis: &[Plan<MaybeVis>],
        model: &Plan<MaybeImage>,
        deconvolve_params: &DeconvolveParams,
        nmajor: usize,
    ) -> Result<ContinuumImaging, BuildError> {
        debug!("Building a continuum imaging pipeline with {nmajor} major cycle(s)");
        let psf = self.invert_sum(vis, model, true);
        let mut model = model.clone();
        for _ in 0..nmajor {
            let dirty = self.residual_sum(vis, &model);
            model = self.deconvolve_with(&dirty, &psf, &model, deconvolve_params)?;
        }
        let residual = self.residual_sum(vis, &model);
        Ok(ContinuumImaging {
            model,
            residual,
            psf,
        })
    }

    /// Like [`GraphBuilder::continuum_imaging`], but from major cycle
    /// `first_selfcal` onwards, the input visibilities are self-calibrated
    /// against the current model before its residual is made. No gains can be
    /// solved against an empty model, so every visibility would be flagged;
    /// `first_selfcal` should be at least 1 unless `model` already has flux.
    pub fn ical(
        &self,
        vis: &[Plan<MaybeVis>],
        model: &Plan<MaybeImage>,
        deconvolve_params: &DeconvolveParams,
        calibrate_params: &CalibrateParams,
        nmajor: usize,
        first_selfcal: usize,
    ) -> Result<Ical, BuildError> {
        debug!(
            "Building an ICAL pipeline with {nmajor} major cycle(s), self-calibrating from cycle {first_selfcal}"
        );
        let psf = self.invert_sum(vis, model, true);
        let mut model = model.clone();
        let mut cal_vis = vis.to_vec();
        for cycle in 0..nmajor {
            if cycle >= first_selfcal {
                cal_vis = self.selfcal(vis, &model, calibrate_params)?;
            }
            let dirty = self.residual_sum(&cal_vis, &model);
            model = self.deconvolve_with(&dirty, &psf, &model, deconvolve_params)?;
        }
        if nmajor >= first_selfcal {
            cal_vis = self.selfcal(vis, &model, calibrate_params)?;
        }
        let residual = self.residual_sum(&cal_vis, &model);
        Ok(Ical {
            model,
            residual,
            psf,
            vis: cal_vis,
        })
    }
}
