// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting visibilities and images into partitions, and putting them back
//! together.
//!
//! The number of partitions is always given by the caller and never derived
//! from the data. Every scatter returns exactly that many partitions; those
//! that would be empty are `None`. Gathers accept `None` partitions and leave
//! their part of the output untouched.

mod error;

pub use error::PartitionError;

use std::ops::Range;

use itertools::{Itertools, MinMaxResult};
use ndarray::prelude::*;

use crate::{
    image::{Image, ImageError, InvertResult},
    math::uvw_in_wavelengths,
    vis::Visibility,
};

/// How visibility rows are split into slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisPartition {
    /// All rows in a single slice.
    Whole,

    /// Contiguous blocks of rows.
    Rows,

    /// Contiguous groups of distinct times.
    Time,

    /// Equal-width bins of w \[wavelengths\].
    W,

    /// Contiguous groups of distinct channels. No imaging context slices by
    /// channel; this is for callers scattering visibilities themselves.
    Channel,
}

/// `len` items split into `n` contiguous ranges whose sizes differ by at most
/// one. Some ranges are empty if `len < n`.
fn split_evenly(len: usize, n: usize) -> Vec<Range<usize>> {
    (0..n).map(|i| (i * len / n)..((i + 1) * len / n)).collect()
}

impl VisPartition {
    /// The row indices of each of the `n` slices of `vis`. Empty slices are
    /// `None`. Rows keep their relative order within a slice.
    pub fn rows(
        self,
        vis: &Visibility,
        n: usize,
    ) -> Result<Vec<Option<Vec<usize>>>, PartitionError> {
        if n == 0 {
            return Err(PartitionError::ZeroPartitions);
        }

        let mut slices: Vec<Vec<usize>> = vec![vec![]; n];
        match self {
            VisPartition::Whole => {
                if n != 1 {
                    return Err(PartitionError::WholeNeedsOne(n));
                }
                slices[0].extend(0..vis.len());
            }

            VisPartition::Rows => {
                for (slice, range) in slices.iter_mut().zip(split_evenly(vis.len(), n)) {
                    slice.extend(range);
                }
            }

            VisPartition::Time => {
                let times = vis.unique_times();
                let slice_of_time = split_evenly(times.len(), n)
                    .into_iter()
                    .enumerate()
                    .flat_map(|(i, r)| r.map(move |_| i))
                    .collect::<Vec<_>>();
                for (row, t) in vis.time.iter().enumerate() {
                    // The time is always present.
                    let i_time = times
                        .binary_search_by(|probe| probe.total_cmp(t))
                        .unwrap_or_else(|i| i);
                    slices[slice_of_time[i_time]].push(row);
                }
            }

            VisPartition::W => {
                let ws = vis
                    .uvw
                    .iter()
                    .zip(vis.frequency.iter())
                    .map(|(&uvw, &freq)| uvw_in_wavelengths(uvw, freq).w)
                    .collect::<Vec<_>>();
                let (w_min, w_max) = match ws.iter().copied().minmax_by(|a, b| a.total_cmp(b)) {
                    MinMaxResult::NoElements => (0.0, 0.0),
                    MinMaxResult::OneElement(w) => (w, w),
                    MinMaxResult::MinMax(min, max) => (min, max),
                };
                let width = (w_max - w_min) / n as f64;
                for (row, w) in ws.into_iter().enumerate() {
                    let i_slice = if width > 0.0 {
                        (((w - w_min) / width).floor() as usize).min(n - 1)
                    } else {
                        0
                    };
                    slices[i_slice].push(row);
                }
            }

            VisPartition::Channel => {
                let chans = vis.unique_channels();
                let slice_of_chan = split_evenly(chans.len(), n)
                    .into_iter()
                    .enumerate()
                    .flat_map(|(i, r)| r.map(move |_| i))
                    .collect::<Vec<_>>();
                for (row, c) in vis.channel.iter().enumerate() {
                    let i_chan = chans.binary_search(c).unwrap_or_else(|i| i);
                    slices[slice_of_chan[i_chan]].push(row);
                }
            }
        }

        Ok(slices
            .into_iter()
            .map(|rows| if rows.is_empty() { None } else { Some(rows) })
            .collect())
    }
}

/// Split `vis` into exactly `n` slices. If `vis` is `None`, so is every slice.
pub fn scatter_visibility(
    vis: Option<&Visibility>,
    partition: VisPartition,
    n: usize,
) -> Result<Vec<Option<Visibility>>, PartitionError> {
    match vis {
        None => {
            if n == 0 {
                return Err(PartitionError::ZeroPartitions);
            }
            Ok(vec![None; n])
        }
        Some(vis) => Ok(partition
            .rows(vis, n)?
            .into_iter()
            .map(|rows| rows.map(|rows| vis.select_rows(&rows)))
            .collect()),
    }
}

/// Write the correlations of each present slice back into the rows of a copy
/// of `original`. The slices must have been made from `original` (or a
/// dataset with the same rows) with the same partition and count.
pub fn gather_visibility(
    parts: &[Option<&Visibility>],
    original: &Visibility,
    partition: VisPartition,
    n: usize,
) -> Result<Visibility, PartitionError> {
    if parts.len() != n {
        return Err(PartitionError::CountMismatch {
            expected: n,
            got: parts.len(),
        });
    }

    let mut out = original.clone();
    for (index, (part, rows)) in parts
        .iter()
        .zip(partition.rows(original, n)?)
        .enumerate()
    {
        let Some(part) = part else { continue };
        let rows = rows.unwrap_or_default();
        if rows.len() != part.len() {
            return Err(PartitionError::RowCount {
                index,
                expected: rows.len(),
                got: part.len(),
            });
        }
        out.assign_rows(&rows, part)?;
    }
    Ok(out)
}

/// How images are split into sub-images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePartition {
    /// A square raster of equally-sized spatial tiles.
    Facets,

    /// Contiguous groups of channels.
    Channels,
}

/// The part of an image covered by a sub-image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub chans: Range<usize>,
    pub y: Range<usize>,
    pub x: Range<usize>,
}

impl ImagePartition {
    /// The `n` tiles of `image`. Facets are ordered by row then column.
    pub fn tiles(self, image: &Image, n: usize) -> Result<Vec<Tile>, PartitionError> {
        if n == 0 {
            return Err(PartitionError::ZeroPartitions);
        }

        let (nchan, _, ny, nx) = image.shape();
        match self {
            ImagePartition::Facets => {
                let facets = (n as f64).sqrt().round() as usize;
                if facets * facets != n {
                    return Err(PartitionError::FacetsNotSquare(n));
                }
                if ny % facets != 0 || nx % facets != 0 {
                    return Err(PartitionError::FacetsDontDivide { facets, ny, nx });
                }
                let (dy, dx) = (ny / facets, nx / facets);
                Ok((0..facets)
                    .cartesian_product(0..facets)
                    .map(|(iy, ix)| Tile {
                        chans: 0..nchan,
                        y: iy * dy..(iy + 1) * dy,
                        x: ix * dx..(ix + 1) * dx,
                    })
                    .collect())
            }

            ImagePartition::Channels => {
                if n > nchan {
                    return Err(PartitionError::TooManyChannelPartitions { n, nchan });
                }
                Ok(split_evenly(nchan, n)
                    .into_iter()
                    .map(|chans| Tile {
                        chans,
                        y: 0..ny,
                        x: 0..nx,
                    })
                    .collect())
            }
        }
    }
}

/// The sub-image of `image` covering `tile`. The sub-image's grid keeps the
/// pixel coordinates of the parent.
fn sub_image(image: &Image, tile: &Tile) -> Image {
    let mut grid = image.grid.clone();
    grid.crpix = (
        grid.crpix.0 - tile.x.start as f64,
        grid.crpix.1 - tile.y.start as f64,
    );
    grid.frequencies = grid.frequencies[tile.chans.clone()].to_vec();
    Image {
        data: image
            .data
            .slice(s![tile.chans.clone(), .., tile.y.clone(), tile.x.clone()])
            .to_owned(),
        grid,
    }
}

/// Split `image` into exactly `n` sub-images.
pub fn scatter_image(
    image: &Image,
    partition: ImagePartition,
    n: usize,
) -> Result<Vec<Image>, PartitionError> {
    Ok(partition
        .tiles(image, n)?
        .iter()
        .map(|tile| sub_image(image, tile))
        .collect())
}

fn check_tile(index: usize, tile: &Tile, part: &Image) -> Result<(), PartitionError> {
    let (nchan, _, ny, nx) = part.shape();
    if (nchan, ny, nx) != (tile.chans.len(), tile.y.len(), tile.x.len()) {
        return Err(PartitionError::TileShape {
            index,
            expected: vec![tile.chans.len(), tile.y.len(), tile.x.len()],
            got: vec![nchan, ny, nx],
        });
    }
    Ok(())
}

/// Assemble sub-images into an image shaped like `template`. Absent parts are
/// left as zeros.
pub fn gather_image(
    parts: &[Option<&Image>],
    template: &Image,
    partition: ImagePartition,
    n: usize,
) -> Result<Image, PartitionError> {
    if parts.len() != n {
        return Err(PartitionError::CountMismatch {
            expected: n,
            got: parts.len(),
        });
    }

    let mut out = template.empty_like();
    for (index, (part, tile)) in parts
        .iter()
        .zip(partition.tiles(template, n)?)
        .enumerate()
    {
        let Some(part) = part else { continue };
        check_tile(index, &tile, part)?;
        if part.num_pols() != out.num_pols() {
            return Err(PartitionError::Image(ImageError::ShapeMismatch {
                left: out.data.shape().to_vec(),
                right: part.data.shape().to_vec(),
            }));
        }
        out.data
            .slice_mut(s![tile.chans, .., tile.y, tile.x])
            .assign(&part.data);
    }
    Ok(out)
}

/// Assemble inversion results into one shaped like `template`. The weights of
/// each channel are those of the first present part covering it; channels no
/// present part covers have zero weight. A `None` template gives `None`.
pub fn gather_invert_results(
    parts: &[Option<&InvertResult>],
    template: Option<&Image>,
    partition: ImagePartition,
    n: usize,
) -> Result<Option<InvertResult>, PartitionError> {
    let Some(template) = template else {
        return Ok(None);
    };

    let images = parts
        .iter()
        .map(|p| p.map(|(image, _)| image))
        .collect::<Vec<_>>();
    let image = gather_image(&images, template, partition, n)?;

    let mut weights = Array2::zeros((image.num_chans(), image.num_pols()));
    let mut assigned = vec![false; image.num_chans()];
    for ((part_image, part_weights), tile) in parts
        .iter()
        .zip(partition.tiles(template, n)?)
        .filter_map(|(part, tile)| part.map(|part| (part, tile)))
    {
        part_image.check_weights(part_weights)?;
        for (i_part_chan, i_chan) in tile.chans.enumerate() {
            if !assigned[i_chan] {
                weights
                    .row_mut(i_chan)
                    .assign(&part_weights.row(i_part_chan));
                assigned[i_chan] = true;
            }
        }
    }

    Ok(Some((image, weights)))
}
