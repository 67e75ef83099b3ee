// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Messages to report to the user.
//!
//! Run summaries are printed in one place so that they come out together,
//! rather than interleaved with whatever the pipeline happens to be doing.

use itertools::Itertools;
use log::info;

use crate::{
    calibration::{CalibrationControl, JonesTerm},
    image::Image,
    vis::Visibility,
};

#[must_use = "This struct must be consumed with its print() method"]
pub(crate) struct IcalDetails<'a> {
    pub(crate) pipeline: &'static str,
    pub(crate) vis_list: &'a [Visibility],
    pub(crate) model: &'a Image,
    pub(crate) num_cycles: usize,
    pub(crate) first_selfcal: Option<usize>,
    pub(crate) calibration_context: &'a str,
    pub(crate) control: &'a CalibrationControl,
}

impl IcalDetails<'_> {
    pub(crate) fn print(self) {
        let num_rows: usize = self.vis_list.iter().map(|v| v.len()).sum();
        info!(
            "{}: {} visibility partitions ({num_rows} samples)",
            self.pipeline,
            self.vis_list.len()
        );
        let [num_chans, num_pols, ny, nx] = self.model.shape();
        info!("  Model image: {nx}x{ny} pixels, {num_chans} channels, {num_pols} polarisations");
        info!("  Cell size: {:.3e} rad", self.model.grid.cellsize);
        info!("  Major cycles: {}", self.num_cycles);
        match self.first_selfcal {
            Some(first) if first < self.num_cycles => {
                info!(
                    "  Self-calibrating from cycle {first} with context '{}'",
                    self.calibration_context
                );
                for term in self
                    .calibration_context
                    .chars()
                    .filter_map(|c| JonesTerm::try_from(c).ok())
                {
                    if let Some(c) = self.control.get(term) {
                        info!(
                            "    {term}: {} gains, time slice {}{}, from iteration {}",
                            c.shape,
                            c.timeslice,
                            if c.phase_only { ", phase only" } else { "" },
                            c.first_iteration
                        );
                    }
                }
            }
            Some(first) => info!(
                "  Self-calibration starts at cycle {first}, after the last cycle ({})",
                self.num_cycles - 1
            ),
            None => info!("  No self-calibration"),
        }
        let antennas = self.vis_list.iter().map(|v| v.num_antennas).unique().join(", ");
        info!("  Antennas per partition: {antennas}");
    }
}
