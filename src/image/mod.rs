// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky images.

An image is a real (channel, polarisation, y, x) cube on a simple
orthographic grid around the phase centre. The polarisation axis holds either
Stokes I alone, or the four instrumental products in [`Jones`] element order.
 */

mod error;

pub use error::ImageError;

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{c64, coord::LMN, Jones};

/// The mapping between pixels and the sky.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkyGrid {
    /// The angular size of a pixel \[radians\]
    pub cellsize: f64,
    /// The (x, y) pixel of the phase centre.
    pub reference_pixel: (f64, f64),
    /// The frequency of each image channel \[Hz\]
    pub frequencies: Vec<f64>,
}

impl SkyGrid {
    /// A grid with the phase centre in the middle pixel (rounded up) of an
    /// `nx` by `ny` image.
    pub fn centred(
        cellsize: f64,
        nx: usize,
        ny: usize,
        frequencies: Vec<f64>,
    ) -> Result<SkyGrid, ImageError> {
        if !(cellsize.is_finite() && cellsize > 0.0) {
            return Err(ImageError::BadCellSize(cellsize));
        }
        Ok(SkyGrid {
            cellsize,
            reference_pixel: ((nx / 2) as f64, (ny / 2) as f64),
            frequencies,
        })
    }

    pub fn pixel_to_lm(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.reference_pixel.0) * self.cellsize,
            (y - self.reference_pixel.1) * self.cellsize,
        )
    }

    pub fn lm_to_pixel(&self, l: f64, m: f64) -> (f64, f64) {
        (
            l / self.cellsize + self.reference_pixel.0,
            m / self.cellsize + self.reference_pixel.1,
        )
    }

    pub fn pixel_to_lmn(&self, x: usize, y: usize) -> LMN {
        let (l, m) = self.pixel_to_lm(x as f64, y as f64);
        LMN::from_lm(l, m)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    /// Axes are (channel, polarisation, y, x).
    pub data: Array4<f64>,
    pub grid: SkyGrid,
}

impl Image {
    pub fn new(data: Array4<f64>, grid: SkyGrid) -> Result<Image, ImageError> {
        let (nchan, npol, _, _) = data.dim();
        if npol != 1 && npol != 4 {
            return Err(ImageError::UnsupportedPolarisations(npol));
        }
        if nchan != grid.frequencies.len() {
            return Err(ImageError::ChannelMismatch {
                image: nchan,
                grid: grid.frequencies.len(),
            });
        }
        Ok(Image { data, grid })
    }

    /// A zero image of `npol` polarisations and `nx` by `ny` pixels.
    pub fn zeros(grid: SkyGrid, npol: usize, ny: usize, nx: usize) -> Result<Image, ImageError> {
        let nchan = grid.frequencies.len();
        Image::new(Array4::zeros((nchan, npol, ny, nx)), grid)
    }

    /// A zero image with twice the pixels along each axis, centred on the
    /// same phase centre. A PSF on this grid covers every shift between two
    /// pixels of this image.
    pub fn psf_template(&self) -> Image {
        let (nchan, npol, ny, nx) = self.data.dim();
        let (ref_x, ref_y) = self.grid.reference_pixel;
        Image {
            data: Array4::zeros((nchan, npol, 2 * ny, 2 * nx)),
            grid: SkyGrid {
                reference_pixel: (ref_x + (nx / 2) as f64, ref_y + (ny / 2) as f64),
                ..self.grid.clone()
            },
        }
    }

    pub fn zeros_like(&self) -> Image {
        Image {
            data: Array4::zeros(self.data.raw_dim()),
            grid: self.grid.clone(),
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        let (c, p, y, x) = self.data.dim();
        [c, p, y, x]
    }

    pub fn num_chans(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn num_pols(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn ny(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn nx(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// Is `other` the same shape and on the same sky grid?
    pub fn same_grid(&self, other: &Image) -> bool {
        self.data.dim() == other.data.dim() && self.grid == other.grid
    }

    fn check_same_grid(&self, other: &Image) -> Result<(), ImageError> {
        if self.data.dim() != other.data.dim() {
            return Err(ImageError::ShapeMismatch(self.shape(), other.shape()));
        }
        if self.grid != other.grid {
            return Err(ImageError::GridMismatch);
        }
        Ok(())
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, &v| acc.max(v.abs()))
    }

    /// Does this image have any non-zero pixels?
    pub fn is_nontrivial(&self) -> bool {
        self.max_abs() > 0.0
    }

    /// Multiply pixel by pixel with `mask`. A single-polarisation mask applies
    /// to all polarisations.
    pub fn multiply_by(&self, mask: &Image) -> Result<Image, ImageError> {
        let mut out = self.clone();
        if mask.num_pols() == 1 && self.num_pols() != 1 {
            if mask.num_chans() != self.num_chans()
                || mask.ny() != self.ny()
                || mask.nx() != self.nx()
            {
                return Err(ImageError::ShapeMismatch(self.shape(), mask.shape()));
            }
            if mask.grid != self.grid {
                return Err(ImageError::GridMismatch);
            }
            for (mut chan, mask_chan) in out.data.outer_iter_mut().zip(mask.data.outer_iter()) {
                let mask_plane = mask_chan.index_axis(Axis(0), 0);
                for mut pol in chan.outer_iter_mut() {
                    pol *= &mask_plane;
                }
            }
            return Ok(out);
        }
        self.check_same_grid(mask)?;
        out.data *= &mask.data;
        Ok(out)
    }

    pub fn add(&self, other: &Image) -> Result<Image, ImageError> {
        self.check_same_grid(other)?;
        let mut out = self.clone();
        out.data += &other.data;
        Ok(out)
    }

    /// The brightness matrix of a pixel in a channel.
    pub fn pixel_jones(&self, chan: usize, y: usize, x: usize) -> Jones {
        brightness_to_jones(self.data.slice(s![chan, .., y, x]))
    }
}

/// Convert polarised brightness to a Jones matrix. Stokes I appears on both
/// parallel hands.
pub fn brightness_to_jones(pols: ArrayView1<f64>) -> Jones {
    match pols.len() {
        1 => Jones::scalar(c64::new(pols[0], 0.0)),
        _ => Jones::from([
            c64::new(pols[0], 0.0),
            c64::new(pols[1], 0.0),
            c64::new(pols[2], 0.0),
            c64::new(pols[3], 0.0),
        ]),
    }
}

/// The inverse of [`brightness_to_jones`]; only the real parts are kept.
pub fn jones_to_brightness(j: Jones, mut pols: ArrayViewMut1<f64>) {
    match pols.len() {
        1 => pols[0] = 0.5 * (j[0].re + j[3].re),
        _ => {
            for (p, e) in pols.iter_mut().zip(j.iter()) {
                *p = e.re;
            }
        }
    }
}
