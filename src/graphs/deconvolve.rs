// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Graphs of deconvolution.

use std::sync::Arc;

use log::debug;

use super::{clean_ignore_none, deconvolve_ignore_none, BuildError, GraphBuilder, MaybeImage};
use crate::{
    graph::Plan,
    image::{Image, InvertResult},
    params::{DeconvolveMode, DeconvolveParams},
    partition::{gather_image, scatter_image, ImagePartition},
};

impl GraphBuilder {
    /// Deconvolve a combined dirty image with its PSF and add the components to
    /// `model`.
    pub fn deconvolve(
        &self,
        dirty: &Plan<InvertResult>,
        psf: &Plan<InvertResult>,
        model: &Plan<MaybeImage>,
        params: &DeconvolveParams,
    ) -> Plan<MaybeImage> {
        let prims = Arc::clone(&self.prims);
        let params = params.clone();
        Plan::task(
            "deconvolve",
            (dirty.clone(), psf.clone(), model.clone()),
            move |((dirty, _), (psf, _), model): (&InvertResult, &InvertResult, &MaybeImage)| {
                deconvolve_ignore_none(prims.as_ref(), Some(dirty), Some(psf), model.as_ref(), &params)
            },
        )
    }

    /// Deconvolve each of `facets` x `facets` facets of the dirty image
    /// independently against the whole PSF, and add the gathered components
    /// to `model`. Nothing is done about the edges of facets.
    ///
    /// Only a zero `facets` is rejected here. The image is not known until the
    /// graph runs, so a `facets` that doesn't divide the image fails then, in
    /// the task that scatters the dirty image.
    pub fn deconvolve_facets(
        &self,
        dirty: &Plan<InvertResult>,
        psf: &Plan<InvertResult>,
        model: &Plan<MaybeImage>,
        params: &DeconvolveParams,
        facets: usize,
    ) -> Result<Plan<MaybeImage>, BuildError> {
        if facets == 0 {
            return Err(BuildError::ZeroPartitions("facets"));
        }
        Ok(self.deconvolve_partitions(
            "deconvolve_facets",
            dirty,
            psf,
            model,
            params,
            ImagePartition::Facets,
            facets * facets,
        ))
    }

    /// Deconvolve each of `subimages` groups of channels independently, and add
    /// the gathered components to `model`. The PSF is split by channel along
    /// with the dirty image.
    pub fn deconvolve_channels(
        &self,
        dirty: &Plan<InvertResult>,
        psf: &Plan<InvertResult>,
        model: &Plan<MaybeImage>,
        params: &DeconvolveParams,
        subimages: usize,
    ) -> Result<Plan<MaybeImage>, BuildError> {
        if subimages == 0 {
            return Err(BuildError::ZeroPartitions("channel groups"));
        }
        Ok(self.deconvolve_partitions(
            "deconvolve_channels",
            dirty,
            psf,
            model,
            params,
            ImagePartition::Channels,
            subimages,
        ))
    }

    /// Deconvolve the way `params.mode` asks for.
    pub fn deconvolve_with(
        &self,
        dirty: &Plan<InvertResult>,
        psf: &Plan<InvertResult>,
        model: &Plan<MaybeImage>,
        params: &DeconvolveParams,
    ) -> Result<Plan<MaybeImage>, BuildError> {
        match params.mode {
            DeconvolveMode::Whole => Ok(self.deconvolve(dirty, psf, model, params)),
            DeconvolveMode::Facets(facets) => {
                self.deconvolve_facets(dirty, psf, model, params, facets)
            }
            DeconvolveMode::Channels(subimages) => {
                self.deconvolve_channels(dirty, psf, model, params, subimages)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn deconvolve_partitions(
        &self,
        name: &str,
        dirty: &Plan<InvertResult>,
        psf: &Plan<InvertResult>,
        model: &Plan<MaybeImage>,
        params: &DeconvolveParams,
        partition: ImagePartition,
        n: usize,
    ) -> Plan<MaybeImage> {
        debug!("Building a {name} graph with {n} partitions");
        let split = |what: &str, plan: &Plan<InvertResult>| {
            Plan::<Vec<Image>>::task(
                format!("{name}_scatter_{what}"),
                plan.clone(),
                move |(image, _): &InvertResult| Ok(scatter_image(image, partition, n)?),
            )
            .split(n)
        };
        let dirty_parts = split("dirty", dirty);
        // Facets are deconvolved against the whole PSF.
        let psf_parts = match partition {
            ImagePartition::Facets => vec![psf.map(format!("{name}_psf"), |(psf, _)| Ok(psf.clone())); n],
            ImagePartition::Channels => split("psf", psf),
        };

        let components = dirty_parts
            .into_iter()
            .zip(psf_parts)
            .enumerate()
            .map(|(i, (d, p))| {
                let prims = Arc::clone(&self.prims);
                let params = params.clone();
                Plan::task(
                    format!("{name}[{i}]"),
                    (d, p),
                    move |(d, p): (&Image, &Image)| {
                        clean_ignore_none(prims.as_ref(), Some(d), Some(p), &params)
                    },
                )
            })
            .collect::<Vec<_>>();

        Plan::task(
            name.to_string(),
            (components, model.clone()),
            move |(components, model): (Vec<&MaybeImage>, &MaybeImage)| {
                let Some(model) = model else {
                    return Ok(None);
                };
                let components = components.into_iter().map(Option::as_ref).collect::<Vec<_>>();
                let gathered = gather_image(&components, model, partition, n)?;
                let mut model = model.clone();
                model.add_assign(&gathered)?;
                Ok(Some(model))
            },
        )
    }
}
