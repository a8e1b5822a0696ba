// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::ImagingContext;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Unknown imaging context '{got}'; supported contexts: {supported}")]
    Unknown { got: String, supported: String },

    #[error("The number of facets per axis must be at least 1")]
    ZeroFacets,

    #[error("The number of visibility slices must be at least 1")]
    ZeroVisSlices,

    #[error("Imaging context '{context}' does not use facets, but {facets} facets per axis were requested")]
    FacetsNotSupported {
        context: ImagingContext,
        facets: usize,
    },

    #[error("Imaging context '{context}' does not slice visibilities, but {vis_slices} slices were requested")]
    SlicesNotSupported {
        context: ImagingContext,
        vis_slices: usize,
    },
}
