// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod ical;
mod skymodel;

use hyperical::{
    image::{Image, SkyGrid},
    imaging::{DftImager, ImagingStage},
    simulate::{simulate_visibility, ObservationLayout},
    vis::Visibility,
};

pub(crate) const FREQ: f64 = 150e6;
pub(crate) const NUM_PIXELS: usize = 32;

/// (y, x, flux density) of the simulated sources.
pub(crate) const SOURCES: [(usize, usize, f64); 2] = [(12, 20, 2.0), (21, 9, 1.0)];

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn grid() -> SkyGrid {
    SkyGrid::centred(3e-3, NUM_PIXELS, NUM_PIXELS, vec![FREQ]).unwrap()
}

pub(crate) fn empty_model() -> Image {
    Image::zeros(grid(), 1, NUM_PIXELS, NUM_PIXELS).unwrap()
}

pub(crate) fn true_sky() -> Image {
    let mut sky = empty_model();
    for (y, x, flux) in SOURCES {
        sky.data[(0, 0, y, x)] = flux;
    }
    sky
}

/// `num_partitions` consecutive chunks of an observation of the true sky.
pub(crate) fn observe(num_partitions: usize) -> Vec<Visibility> {
    let imager = DftImager::default();
    (0..num_partitions)
        .map(|p| {
            let mut layout = ObservationLayout::new(10, 4, 60.0, vec![FREQ]);
            for t in layout.times.iter_mut() {
                *t += p as f64 * 240.0;
            }
            let mut vis = simulate_visibility(&layout);
            imager.predict(&mut vis, &true_sky()).unwrap();
            vis
        })
        .collect()
}

/// The sum of the model within a pixel of (y, x).
pub(crate) fn flux_near(image: &Image, y: usize, x: usize) -> f64 {
    image
        .data
        .slice(ndarray::s![0, 0, y - 1..=y + 1, x - 1..=x + 1])
        .sum()
}
