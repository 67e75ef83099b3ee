// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with images.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image shapes differ: {0:?} vs. {1:?}")]
    ShapeMismatch([usize; 4], [usize; 4]),

    #[error("Images are on different sky grids")]
    GridMismatch,

    #[error("Images must have 1 (Stokes I) or 4 (XX, XY, YX, YY) polarisations, not {0}")]
    UnsupportedPolarisations(usize),

    #[error("Image has {image} channels but the grid has {grid} frequencies")]
    ChannelMismatch { image: usize, grid: usize },

    #[error("Cell size must be positive and finite, not {0}")]
    BadCellSize(f64),
}
