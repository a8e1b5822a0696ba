// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Imaging contexts.

An imaging context names a way of decomposing invert and predict: how the
image is tiled, how the visibilities are sliced, and which of the two is
iterated over in the inner loop. A context is resolved once, when a graph
builder is made, into a [`ResolvedContext`].
 */

mod error;

pub use error::ContextError;

use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::partition::{ImagePartition, VisPartition};

lazy_static::lazy_static! {
    pub(crate) static ref IMAGING_CONTEXTS_COMMA_SEPARATED: String = ImagingContext::iter().join(", ");
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum ImagingContext {
    /// No facets and no visibility slices.
    #[strum(serialize = "2d")]
    #[serde(rename = "2d")]
    TwoD,

    #[strum(serialize = "facets")]
    #[serde(rename = "facets")]
    Facets,

    /// Visibilities sliced into blocks of rows.
    #[strum(serialize = "slice")]
    #[serde(rename = "slice")]
    Slice,

    #[strum(serialize = "timeslice")]
    #[serde(rename = "timeslice")]
    Timeslice,

    #[strum(serialize = "wstack")]
    #[serde(rename = "wstack")]
    Wstack,

    #[strum(serialize = "facets_slice")]
    #[serde(rename = "facets_slice")]
    FacetsSlice,

    #[strum(serialize = "facets_timeslice")]
    #[serde(rename = "facets_timeslice")]
    FacetsTimeslice,

    #[strum(serialize = "facets_wstack")]
    #[serde(rename = "facets_wstack")]
    FacetsWstack,
}

/// Which partitions are iterated over in the inner loop of invert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerLoop {
    /// Sum over visibility slices for each tile, then gather the tiles.
    Vis,

    /// Gather the tiles for each visibility slice, then sum over the slices.
    Image,
}

/// An [`ImagingContext`] together with the partition counts it was validated
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedContext {
    pub context: ImagingContext,
    pub image_partition: ImagePartition,
    pub vis_partition: VisPartition,
    pub inner: InnerLoop,

    /// The number of facets along each image axis.
    pub facets: usize,

    pub vis_slices: usize,
}

impl ResolvedContext {
    /// The number of image tiles.
    pub fn num_tiles(&self) -> usize {
        self.facets * self.facets
    }
}

impl ImagingContext {
    /// Parse a context name, listing the valid names on failure.
    pub fn parse(s: &str) -> Result<ImagingContext, ContextError> {
        ImagingContext::from_str(s).map_err(|_| ContextError::Unknown {
            got: s.to_string(),
            supported: IMAGING_CONTEXTS_COMMA_SEPARATED.clone(),
        })
    }

    fn uses_facets(self) -> bool {
        matches!(
            self,
            ImagingContext::Facets
                | ImagingContext::FacetsSlice
                | ImagingContext::FacetsTimeslice
                | ImagingContext::FacetsWstack
        )
    }

    fn vis_partition(self) -> VisPartition {
        match self {
            ImagingContext::TwoD | ImagingContext::Facets => VisPartition::Whole,
            ImagingContext::Slice | ImagingContext::FacetsSlice => VisPartition::Rows,
            ImagingContext::Timeslice | ImagingContext::FacetsTimeslice => VisPartition::Time,
            ImagingContext::Wstack | ImagingContext::FacetsWstack => VisPartition::W,
        }
    }

    fn inner(self) -> InnerLoop {
        match self {
            ImagingContext::Slice | ImagingContext::Timeslice | ImagingContext::Wstack => {
                InnerLoop::Image
            }
            _ => InnerLoop::Vis,
        }
    }

    /// Resolve this context for `facets` facets per axis and `vis_slices`
    /// visibility slices. Counts the context cannot provide are an error.
    pub fn resolve(self, facets: usize, vis_slices: usize) -> Result<ResolvedContext, ContextError> {
        if facets == 0 {
            return Err(ContextError::ZeroFacets);
        }
        if vis_slices == 0 {
            return Err(ContextError::ZeroVisSlices);
        }
        if !self.uses_facets() && facets != 1 {
            return Err(ContextError::FacetsNotSupported {
                context: self,
                facets,
            });
        }
        let vis_partition = self.vis_partition();
        if vis_partition == VisPartition::Whole && vis_slices != 1 {
            return Err(ContextError::SlicesNotSupported {
                context: self,
                vis_slices,
            });
        }

        Ok(ResolvedContext {
            context: self,
            image_partition: ImagePartition::Facets,
            vis_partition,
            inner: self.inner(),
            facets,
            vis_slices,
        })
    }
}
