// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Graphs of calibration.

use std::sync::Arc;

use log::debug;

use super::{
    apply_ignore_none, check_lengths, solve_ignore_none, BuildError, GraphBuilder,
    MaybeGainTable, MaybeImage, MaybeVis,
};
use crate::{
    graph::Plan,
    params::CalibrateParams,
    vis::{divide_visibility, gather_channels, integrate_by_channel},
};

impl GraphBuilder {
    /// Solve for the gains of each dataset against its model visibilities.
    ///
    /// With a global solution, the ratio of each dataset to its model is
    /// gathered into one dataset, averaged over channels, and solved once
    /// against a unit point source; every entry of the returned list is then
    /// the same plan. Otherwise each dataset is solved on its own.
    pub fn solve(
        &self,
        vis: &[Plan<MaybeVis>],
        model_vis: &[Plan<MaybeVis>],
        params: &CalibrateParams,
    ) -> Result<Vec<Plan<MaybeGainTable>>, BuildError> {
        check_lengths("model visibility", vis.len(), model_vis.len())?;
        debug!(
            "Building a {} calibration graph for {} dataset(s)",
            if params.global_solution { "global" } else { "local" },
            vis.len()
        );

        if params.global_solution {
            let ratios = vis
                .iter()
                .zip(model_vis)
                .enumerate()
                .map(|(i, (v, m))| {
                    Plan::task(
                        format!("divide[{i}]"),
                        (v.clone(), m.clone()),
                        |(v, m): (&MaybeVis, &MaybeVis)| match (v, m) {
                            (Some(v), Some(m)) => Ok(Some(divide_visibility(v, m)?)),
                            _ => Ok(None),
                        },
                    )
                })
                .collect::<Vec<_>>();
            let integrated = Plan::task("gather_channels", ratios, |ratios: Vec<&MaybeVis>| {
                let present = ratios.into_iter().flatten().collect::<Vec<_>>();
                if present.is_empty() {
                    return Ok(None);
                }
                let gathered = gather_channels(&present)?;
                Ok(Some(integrate_by_channel(&gathered)))
            });

            // The gathered data have been integrated over channels, so there is
            // only one channel to solve.
            let params = CalibrateParams {
                per_channel: false,
                ..params.clone()
            };
            let prims = Arc::clone(&self.prims);
            let gain_table = Plan::task("solve_global", integrated, move |v: &MaybeVis| {
                solve_ignore_none(prims.as_ref(), v.as_ref(), None, true, &params)
            });
            Ok(vec![gain_table; vis.len()])
        } else {
            Ok(vis
                .iter()
                .zip(model_vis)
                .enumerate()
                .map(|(i, (v, m))| {
                    let prims = Arc::clone(&self.prims);
                    let params = params.clone();
                    Plan::task(
                        format!("solve[{i}]"),
                        (v.clone(), m.clone()),
                        move |(v, m): (&MaybeVis, &MaybeVis)| {
                            solve_ignore_none(prims.as_ref(), v.as_ref(), m.as_ref(), false, &params)
                        },
                    )
                })
                .collect())
        }
    }

    /// Apply (or, if `inverse`, remove) each dataset's gains.
    pub fn apply(
        &self,
        vis: &[Plan<MaybeVis>],
        gain_tables: &[Plan<MaybeGainTable>],
        inverse: bool,
    ) -> Result<Vec<Plan<MaybeVis>>, BuildError> {
        check_lengths("gain table", vis.len(), gain_tables.len())?;
        Ok(vis
            .iter()
            .zip(gain_tables)
            .enumerate()
            .map(|(i, (v, gt))| {
                let prims = Arc::clone(&self.prims);
                Plan::task(
                    format!("apply[{i}]"),
                    (v.clone(), gt.clone()),
                    move |(v, gt): (&MaybeVis, &MaybeGainTable)| {
                        apply_ignore_none(prims.as_ref(), v.as_ref(), gt.as_ref(), inverse)
                    },
                )
            })
            .collect())
    }

    /// Calibrate each dataset against its model visibilities, returning the
    /// corrected datasets.
    pub fn calibrate(
        &self,
        vis: &[Plan<MaybeVis>],
        model_vis: &[Plan<MaybeVis>],
        params: &CalibrateParams,
    ) -> Result<Vec<Plan<MaybeVis>>, BuildError> {
        let gain_tables = self.solve(vis, model_vis, params)?;
        self.apply(vis, &gain_tables, true)
    }

    /// Calibrate each dataset against the visibilities predicted from
    /// `model`.
    pub fn selfcal(
        &self,
        vis: &[Plan<MaybeVis>],
        model: &Plan<MaybeImage>,
        params: &CalibrateParams,
    ) -> Result<Vec<Plan<MaybeVis>>, BuildError> {
        let model_vis = self.predict(&self.zero(vis), model);
        self.calibrate(vis, &model_vis, params)
    }
}
