// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Builders of imaging graphs.

Every builder takes one plan per visibility dataset and returns one plan per
dataset, in the same order. Builders only wire plans together; nothing is
computed until the plans are handed to an [`Engine`](crate::Engine).

The number of sub-tasks each builder makes is fixed by [`ImagingParams`] when
the [`GraphBuilder`] is made. Any sub-task may produce no data (`None`); this
is never an error, and the combinators downstream treat it as a no-op.
 */

mod adapters;
mod calibrate;
mod deconvolve;
mod error;
mod imaging;
mod pipelines;
mod reduce;
#[cfg(test)]
mod tests;
mod vis;

pub use adapters::*;
pub use error::{BuildError, ReduceError};
pub use pipelines::{ContinuumImaging, Ical};
pub use reduce::{sum_invert_results, sum_predict_results, unnormalise};

use std::sync::Arc;

use log::debug;

use crate::{
    calibrate::GainTable,
    context::ResolvedContext,
    graph::Plan,
    image::{Image, InvertResult},
    params::ImagingParams,
    partition::{scatter_image, scatter_visibility},
    primitives::NumericPrimitives,
    vis::{BlockVisibility, Visibility},
};

pub type MaybeVis = Option<Visibility>;
pub type MaybeBlockVis = Option<BlockVisibility>;
pub type MaybeImage = Option<Image>;
pub type MaybeInvertResult = Option<InvertResult>;
pub type MaybeGainTable = Option<GainTable>;

/// Builds graphs for one imaging context. The context is resolved, and its
/// partition counts validated, once.
#[derive(Clone)]
pub struct GraphBuilder {
    params: ImagingParams,
    context: ResolvedContext,
    prims: Arc<dyn NumericPrimitives>,
}

impl GraphBuilder {
    pub fn new(
        params: ImagingParams,
        prims: Arc<dyn NumericPrimitives>,
    ) -> Result<GraphBuilder, BuildError> {
        let context = params.context.resolve(params.facets, params.vis_slices)?;
        debug!(
            "Imaging context '{}': {} vis slice(s) ({:?}), {} facet(s) per axis, inner loop over {:?}",
            context.context, context.vis_slices, context.vis_partition, context.facets, context.inner
        );
        Ok(GraphBuilder {
            params,
            context,
            prims,
        })
    }

    pub fn params(&self) -> &ImagingParams {
        &self.params
    }

    pub fn context(&self) -> &ResolvedContext {
        &self.context
    }

    pub fn primitives(&self) -> Arc<dyn NumericPrimitives> {
        Arc::clone(&self.prims)
    }

    /// Split a dataset into the context's visibility slices.
    fn scatter_vis(&self, name: &str, vis: &Plan<MaybeVis>) -> Vec<Plan<MaybeVis>> {
        let partition = self.context.vis_partition;
        let n = self.context.vis_slices;
        Plan::<Vec<MaybeVis>>::task(format!("scatter_{name}"), vis.clone(), move |vis: &MaybeVis| {
            Ok(scatter_visibility(vis.as_ref(), partition, n)?)
        })
        .split(n)
    }

    /// Split an image into the context's tiles.
    fn scatter_tiles(&self, name: &str, image: &Plan<MaybeImage>) -> Vec<Plan<MaybeImage>> {
        let partition = self.context.image_partition;
        let n = self.context.num_tiles();
        Plan::<Vec<MaybeImage>>::task(format!("scatter_{name}"), image.clone(), move |image: &MaybeImage| {
            Ok(match image {
                Some(image) => scatter_image(image, partition, n)?
                    .into_iter()
                    .map(Some)
                    .collect(),
                None => vec![None; n],
            })
        })
        .split(n)
    }
}

/// Return an error if a list meant to pair with `num_vis` visibility plans has
/// a different length.
fn check_lengths(what: &'static str, num_vis: usize, got: usize) -> Result<(), BuildError> {
    if num_vis != got {
        return Err(BuildError::LengthMismatch {
            what,
            vis: num_vis,
            got,
        });
    }
    Ok(())
}
