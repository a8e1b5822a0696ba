// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Graphs of element-wise visibility operations.

use std::sync::Arc;

use super::{check_lengths, weight_ignore_none, BuildError, GraphBuilder, MaybeBlockVis, MaybeImage, MaybeVis};
use crate::{graph::Plan, params::Weighting, vis::subtract_visibility};

impl GraphBuilder {
    /// Convert block visibilities to row form.
    pub fn coalesce(&self, blocks: &[Plan<MaybeBlockVis>]) -> Vec<Plan<MaybeVis>> {
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                Plan::task(format!("coalesce[{i}]"), block.clone(), |block: &MaybeBlockVis| {
                    Ok(block.as_ref().map(|b| b.coalesce()))
                })
            })
            .collect()
    }

    /// Copies of the visibilities with every correlation set to zero.
    pub fn zero(&self, vis: &[Plan<MaybeVis>]) -> Vec<Plan<MaybeVis>> {
        vis.iter()
            .enumerate()
            .map(|(i, v)| {
                Plan::task(format!("zero[{i}]"), v.clone(), |v: &MaybeVis| {
                    Ok(v.as_ref().map(|v| v.zeroed()))
                })
            })
            .collect()
    }

    /// `vis[i] - model_vis[i]` for every dataset.
    pub fn subtract(
        &self,
        vis: &[Plan<MaybeVis>],
        model_vis: &[Plan<MaybeVis>],
    ) -> Result<Vec<Plan<MaybeVis>>, BuildError> {
        check_lengths("model visibility", vis.len(), model_vis.len())?;
        Ok(self.subtract_pairs(vis, model_vis))
    }

    /// Like [`GraphBuilder::subtract`], for lists known to have the same
    /// length.
    pub(super) fn subtract_pairs(
        &self,
        vis: &[Plan<MaybeVis>],
        model_vis: &[Plan<MaybeVis>],
    ) -> Vec<Plan<MaybeVis>> {
        vis.iter()
            .zip(model_vis)
            .enumerate()
            .map(|(i, (v, m))| {
                Plan::task(
                    format!("subtract[{i}]"),
                    (v.clone(), m.clone()),
                    |(v, m): (&MaybeVis, &MaybeVis)| match (v, m) {
                        (Some(v), Some(m)) => Ok(Some(subtract_visibility(v, m)?)),
                        _ => Ok(None),
                    },
                )
            })
            .collect()
    }

    /// Set the imaging weights of every dataset against the uv grid of
    /// `model`.
    pub fn weight(
        &self,
        vis: &[Plan<MaybeVis>],
        model: &Plan<MaybeImage>,
        scheme: Weighting,
    ) -> Vec<Plan<MaybeVis>> {
        vis.iter()
            .enumerate()
            .map(|(i, v)| {
                let prims = Arc::clone(&self.prims);
                Plan::task(
                    format!("weight[{i}]"),
                    (v.clone(), model.clone()),
                    move |(v, model): (&MaybeVis, &MaybeImage)| {
                        weight_ignore_none(prims.as_ref(), v.as_ref(), model.as_ref(), scheme)
                    },
                )
            })
            .collect()
    }
}
