// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Graphs of inversion and prediction.
//!
//! Each dataset is split into visibility slices and the image into tiles, and a
//! leaf task runs for every (slice, tile) pair. The order in which the leaves
//! are recombined is given by the context's inner loop.

use std::sync::Arc;

use log::debug;

use super::{
    invert_ignore_none, predict_ignore_none, sum_invert_ignore_none, sum_invert_results,
    sum_predict_results, unnormalise, GraphBuilder, MaybeImage, MaybeInvertResult, MaybeVis,
    ReduceError,
};
use crate::{
    context::InnerLoop,
    graph::Plan,
    image::InvertResult,
    partition::{gather_invert_results, gather_visibility},
};

impl GraphBuilder {
    /// The dirty image (or PSF, if `dopsf`) of each dataset on the grid of
    /// `template`. A result is `None` only if the template is.
    ///
    /// Results are normalised by their sum of weights unless
    /// [`ImagingParams::normalize`](crate::ImagingParams::normalize) is
    /// false.
    pub fn invert(
        &self,
        vis: &[Plan<MaybeVis>],
        template: &Plan<MaybeImage>,
        dopsf: bool,
    ) -> Vec<Plan<MaybeInvertResult>> {
        self.invert_with(vis, template, dopsf, self.params.normalize)
    }

    fn invert_with(
        &self,
        vis: &[Plan<MaybeVis>],
        template: &Plan<MaybeImage>,
        dopsf: bool,
        normalize: bool,
    ) -> Vec<Plan<MaybeInvertResult>> {
        let kind = if dopsf { "psf" } else { "invert" };
        let ResolvedParts {
            image_partition,
            num_tiles,
            num_slices,
            inner,
        } = self.parts();
        debug!(
            "Building {kind} graphs for {} dataset(s): {num_slices} slice(s) x {num_tiles} tile(s) each",
            vis.len()
        );

        let tiles = self.scatter_tiles(&format!("{kind}_template"), template);
        vis.iter()
            .enumerate()
            .map(|(i, v)| {
                let slices = self.scatter_vis(&format!("{kind}[{i}]"), v);
                let leaf = |i_slice: usize, i_tile: usize| {
                    let prims = Arc::clone(&self.prims);
                    Plan::task(
                        format!("{kind}[{i}][slice {i_slice}][tile {i_tile}]"),
                        (slices[i_slice].clone(), tiles[i_tile].clone()),
                        move |(s, t): (&MaybeVis, &MaybeImage)| {
                            invert_ignore_none(prims.as_ref(), s.as_ref(), t.as_ref(), dopsf)
                        },
                    )
                };
                let gather = |name: String, parts: Vec<Plan<MaybeInvertResult>>| {
                    Plan::task(
                        name,
                        (parts, template.clone()),
                        move |(parts, template): (Vec<&MaybeInvertResult>, &MaybeImage)| {
                            let parts = parts.into_iter().map(Option::as_ref).collect::<Vec<_>>();
                            Ok(gather_invert_results(
                                &parts,
                                template.as_ref(),
                                image_partition,
                                num_tiles,
                            )?)
                        },
                    )
                };
                let sum = |name: String, parts: Vec<Plan<MaybeInvertResult>>| {
                    Plan::task(name, parts, |parts: Vec<&MaybeInvertResult>| {
                        let parts = parts.into_iter().map(Option::as_ref).collect::<Vec<_>>();
                        sum_invert_ignore_none(&parts)
                    })
                };

                let result = match inner {
                    // Sum over the slices of each tile, then gather the tiles.
                    InnerLoop::Vis => {
                        let per_tile = (0..num_tiles)
                            .map(|i_tile| {
                                sum(
                                    format!("{kind}[{i}][tile {i_tile}]"),
                                    (0..num_slices).map(|i_slice| leaf(i_slice, i_tile)).collect(),
                                )
                            })
                            .collect();
                        gather(format!("{kind}[{i}]"), per_tile)
                    }

                    // Gather the tiles of each slice, then sum over the slices.
                    InnerLoop::Image => {
                        let per_slice = (0..num_slices)
                            .map(|i_slice| {
                                gather(
                                    format!("{kind}[{i}][slice {i_slice}]"),
                                    (0..num_tiles).map(|i_tile| leaf(i_slice, i_tile)).collect(),
                                )
                            })
                            .collect();
                        sum(format!("{kind}[{i}]"), per_slice)
                    }
                };

                if normalize {
                    result
                } else {
                    result.map(format!("{kind}[{i}] (unnormalised)"), |r| {
                        Ok(r.as_ref().map(unnormalise))
                    })
                }
            })
            .collect()
    }

    /// Combine the inversion results of many datasets into one. At least one
    /// result must be present when the graph is computed.
    pub fn sum_invert(&self, results: &[Plan<MaybeInvertResult>]) -> Plan<InvertResult> {
        sum_invert_with(results, self.params.normalize)
    }

    /// [`GraphBuilder::invert`] followed by [`GraphBuilder::sum_invert`].
    pub fn invert_sum(
        &self,
        vis: &[Plan<MaybeVis>],
        template: &Plan<MaybeImage>,
        dopsf: bool,
    ) -> Plan<InvertResult> {
        self.sum_invert(&self.invert(vis, template, dopsf))
    }

    /// The visibilities of `model` at the rows of each dataset. Everything but
    /// the correlations is copied from the input datasets.
    pub fn predict(&self, vis: &[Plan<MaybeVis>], model: &Plan<MaybeImage>) -> Vec<Plan<MaybeVis>> {
        let ResolvedParts {
            num_tiles,
            num_slices,
            ..
        } = self.parts();
        let vis_partition = self.context.vis_partition;
        debug!(
            "Building predict graphs for {} dataset(s): {num_slices} slice(s) x {num_tiles} tile(s) each",
            vis.len()
        );

        let tiles = self.scatter_tiles("predict_model", model);
        vis.iter()
            .enumerate()
            .map(|(i, v)| {
                let slices = self.scatter_vis(&format!("predict[{i}]"), v);
                let per_slice = slices
                    .iter()
                    .enumerate()
                    .map(|(i_slice, slice)| {
                        let per_tile = tiles
                            .iter()
                            .enumerate()
                            .map(|(i_tile, tile)| {
                                let prims = Arc::clone(&self.prims);
                                Plan::task(
                                    format!("predict[{i}][slice {i_slice}][tile {i_tile}]"),
                                    (slice.clone(), tile.clone()),
                                    move |(s, t): (&MaybeVis, &MaybeImage)| {
                                        predict_ignore_none(prims.as_ref(), s.as_ref(), t.as_ref())
                                    },
                                )
                            })
                            .collect::<Vec<_>>();
                        Plan::task(
                            format!("predict[{i}][slice {i_slice}]"),
                            per_tile,
                            |parts: Vec<&MaybeVis>| {
                                let parts = parts.into_iter().map(Option::as_ref).collect::<Vec<_>>();
                                Ok(sum_predict_results(&parts)?)
                            },
                        )
                    })
                    .collect::<Vec<_>>();

                Plan::task(
                    format!("predict[{i}]"),
                    (per_slice, v.clone()),
                    move |(parts, vis): (Vec<&MaybeVis>, &MaybeVis)| {
                        let Some(vis) = vis else {
                            return Ok(None);
                        };
                        let parts = parts.into_iter().map(Option::as_ref).collect::<Vec<_>>();
                        // No prediction could be made without a model.
                        if !vis.is_empty() && parts.iter().all(Option::is_none) {
                            return Ok(None);
                        }
                        Ok(Some(gather_visibility(&parts, vis, vis_partition, num_slices)?))
                    },
                )
            })
            .collect()
    }

    /// The residual image of each dataset against `model`.
    ///
    /// Residuals are always normalised by their sum of weights, whatever
    /// [`ImagingParams::normalize`](crate::ImagingParams::normalize) says, so
    /// that they are in the units of the model.
    pub fn residual(
        &self,
        vis: &[Plan<MaybeVis>],
        model: &Plan<MaybeImage>,
    ) -> Vec<Plan<MaybeInvertResult>> {
        let model_vis = self.predict(&self.zero(vis), model);
        let residual_vis = self.subtract_pairs(vis, &model_vis);
        self.invert_with(&residual_vis, model, false, true)
    }

    /// [`GraphBuilder::residual`] followed by a weighted sum over datasets.
    pub fn residual_sum(&self, vis: &[Plan<MaybeVis>], model: &Plan<MaybeImage>) -> Plan<InvertResult> {
        sum_invert_with(&self.residual(vis, model), true)
    }

    fn parts(&self) -> ResolvedParts {
        ResolvedParts {
            image_partition: self.context.image_partition,
            num_tiles: self.context.num_tiles(),
            num_slices: self.context.vis_slices,
            inner: self.context.inner,
        }
    }
}

struct ResolvedParts {
    image_partition: crate::partition::ImagePartition,
    num_tiles: usize,
    num_slices: usize,
    inner: InnerLoop,
}

fn sum_invert_with(results: &[Plan<MaybeInvertResult>], normalize: bool) -> Plan<InvertResult> {
    Plan::task("sum_invert", results.to_vec(), move |results: Vec<&MaybeInvertResult>| {
        let results = results.into_iter().map(Option::as_ref).collect::<Vec<_>>();
        if normalize {
            Ok(sum_invert_results(&results)?)
        } else {
            // Unnormalised results are plain sums.
            let mut present = results.into_iter().flatten();
            let (image, weights) = present.next().ok_or(ReduceError::NoInvertResults)?;
            let (mut image, mut weights) = (image.clone(), weights.clone());
            image.check_weights(&weights)?;
            for (part_image, part_weights) in present {
                part_image.check_weights(part_weights)?;
                image.add_assign(part_image)?;
                weights += part_weights;
            }
            Ok((image, weights))
        }
    })
}
