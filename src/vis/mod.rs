// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Visibility containers.

Samples are held either in a flat, per-row form ([`Visibility`]), or grouped
into a dense (time, baseline, channel) cube ([`BlockVisibility`]). Calibration
works on the block form; imaging works on the flat form. Every sample holds
all four instrumental polarisations as a [`Jones`] matrix.

Weights less than or equal to zero indicate a flagged sample. Flagging a sample
negates its weight, so that the original weight is recoverable.
 */

mod error;
#[cfg(test)]
mod tests;

pub use error::VisError;

use std::cmp::Ordering;

use itertools::Itertools;
use log::trace;
use ndarray::prelude::*;

use crate::{coord::UVW, Jones};

/// A pair of antennas. `antenna1 <= antenna2` is not required, but the solvers
/// ignore autocorrelations (`antenna1 == antenna2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Baseline {
    pub antenna1: usize,
    pub antenna2: usize,
}

impl Baseline {
    pub fn new(antenna1: usize, antenna2: usize) -> Baseline {
        Baseline { antenna1, antenna2 }
    }

    pub fn is_auto(&self) -> bool {
        self.antenna1 == self.antenna2
    }
}

/// A single visibility sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisRow {
    /// The centroid time of the integration \[seconds\]
    pub time: f64,
    /// \[seconds\]
    pub integration_time: f64,
    pub baseline: Baseline,
    /// Index into the observation's channels.
    pub channel: usize,
    /// \[Hz\]
    pub frequency: f64,
    pub uvw: UVW,
    pub vis: Jones,
    pub weight: f64,
}

impl VisRow {
    pub fn is_flagged(&self) -> bool {
        is_flagged_weight(self.weight)
    }
}

/// Visibilities in flat, per-sample form.
#[derive(Clone, Debug, PartialEq)]
pub struct Visibility {
    pub num_antennas: usize,
    pub rows: Vec<VisRow>,
}

impl Visibility {
    pub fn new(num_antennas: usize, rows: Vec<VisRow>) -> Visibility {
        Visibility { num_antennas, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a copy of these visibilities with all data zeroed. Weights and
    /// metadata are retained.
    pub fn zeroed_copy(&self) -> Visibility {
        let mut copy = self.clone();
        copy.zero();
        copy
    }

    pub fn zero(&mut self) {
        self.rows.iter_mut().for_each(|r| r.vis = Jones::zero());
    }

    /// `self - other`, sample by sample. Both sets must have identical sample
    /// layouts. Flags from either input are carried into the output.
    pub fn subtract(&self, other: &Visibility) -> Result<Visibility, VisError> {
        if self.rows.len() != other.rows.len() {
            return Err(VisError::LayoutMismatch(format!(
                "{} rows vs. {} rows",
                self.rows.len(),
                other.rows.len()
            )));
        }
        let mut out = self.clone();
        for (i, (row, other)) in out.rows.iter_mut().zip(other.rows.iter()).enumerate() {
            if row.time != other.time
                || row.baseline != other.baseline
                || row.channel != other.channel
            {
                return Err(VisError::LayoutMismatch(format!("row {i} differs")));
            }
            row.vis -= other.vis;
            if other.is_flagged() && !row.is_flagged() {
                row.weight = -row.weight;
            }
        }
        Ok(out)
    }

    /// Convert to the block form. Missing samples are held with zero weight.
    /// The row order is remembered, so that [`BlockVisibility::to_flat`]
    /// reproduces these visibilities exactly.
    pub fn to_block(&self) -> Result<BlockVisibility, VisError> {
        let times = self
            .rows
            .iter()
            .map(|r| r.time)
            .sorted_by(f64::total_cmp)
            .dedup()
            .collect::<Vec<_>>();
        let baselines = self
            .rows
            .iter()
            .map(|r| r.baseline)
            .sorted()
            .dedup()
            .collect::<Vec<_>>();
        for bl in &baselines {
            let antenna = bl.antenna1.max(bl.antenna2);
            if antenna >= self.num_antennas {
                return Err(VisError::AntennaOutOfRange {
                    antenna,
                    num_antennas: self.num_antennas,
                });
            }
        }
        let num_chans = self.rows.iter().map(|r| r.channel + 1).max().unwrap_or(0);

        let mut frequencies = vec![None; num_chans];
        let mut integration_times = vec![None; times.len()];
        let mut uvws: Array2<Option<UVW>> = Array2::from_elem((times.len(), baselines.len()), None);
        let mut vis = Array3::from_elem((times.len(), baselines.len(), num_chans), Jones::zero());
        let mut weights = Array3::zeros((times.len(), baselines.len(), num_chans));
        let mut present = Array3::from_elem((times.len(), baselines.len(), num_chans), false);
        let mut row_order = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            // Both searches are guaranteed to succeed, as the keys were
            // collected from these same rows.
            let i_time = search_time(&times, row.time).unwrap_or_default();
            let i_bl = baselines.binary_search(&row.baseline).unwrap_or_default();
            let i_chan = row.channel;

            if present[(i_time, i_bl, i_chan)] {
                return Err(VisError::DuplicateSample {
                    time: row.time,
                    antenna1: row.baseline.antenna1,
                    antenna2: row.baseline.antenna2,
                    channel: row.channel,
                });
            }
            match frequencies[i_chan] {
                None => frequencies[i_chan] = Some(row.frequency),
                Some(f) if f != row.frequency => {
                    return Err(VisError::InconsistentFrequency {
                        channel: i_chan,
                        first: f,
                        other: row.frequency,
                    })
                }
                _ => (),
            }
            match integration_times[i_time] {
                None => integration_times[i_time] = Some(row.integration_time),
                Some(t) if t != row.integration_time => {
                    return Err(VisError::InconsistentIntegrationTime(row.time))
                }
                _ => (),
            }
            match uvws[(i_time, i_bl)] {
                None => uvws[(i_time, i_bl)] = Some(row.uvw),
                Some(uvw) if uvw != row.uvw => {
                    return Err(VisError::InconsistentUvw {
                        time: row.time,
                        antenna1: row.baseline.antenna1,
                        antenna2: row.baseline.antenna2,
                    })
                }
                _ => (),
            }

            present[(i_time, i_bl, i_chan)] = true;
            vis[(i_time, i_bl, i_chan)] = row.vis;
            weights[(i_time, i_bl, i_chan)] = row.weight;
            row_order.push([i_time, i_bl, i_chan]);
        }

        let frequencies = frequencies
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.ok_or(VisError::MissingChannel(i)))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(
            "Converted {} rows into a {}x{}x{} block",
            self.rows.len(),
            times.len(),
            baselines.len(),
            num_chans
        );

        Ok(BlockVisibility {
            num_antennas: self.num_antennas,
            integration_times: integration_times
                .into_iter()
                .map(|t| t.unwrap_or_default())
                .collect(),
            times,
            baselines,
            frequencies,
            uvws: uvws.mapv(|uvw| uvw.unwrap_or_default()),
            vis,
            weights,
            row_order: Some(row_order),
        })
    }
}

/// Weights that aren't positive (including NaN) are flagged.
pub(crate) fn is_flagged_weight(weight: f64) -> bool {
    weight.is_nan() || weight <= 0.0
}

fn search_time(times: &[f64], time: f64) -> Option<usize> {
    times.binary_search_by(|t| t.total_cmp(&time)).ok()
}

/// Visibilities grouped by time and baseline. The data cube's axes are (time,
/// baseline, channel).
#[derive(Clone, Debug, PartialEq)]
pub struct BlockVisibility {
    pub num_antennas: usize,
    /// Unique, ascending sample times \[seconds\]
    pub times: Vec<f64>,
    /// The integration time of each entry of `times` \[seconds\]
    pub integration_times: Vec<f64>,
    pub baselines: Vec<Baseline>,
    /// \[Hz\]
    pub frequencies: Vec<f64>,
    /// Axes are (time, baseline).
    pub uvws: Array2<UVW>,
    pub vis: Array3<Jones>,
    pub weights: Array3<f64>,

    /// The flat rows that this block was built from, as (time, baseline,
    /// channel) indices. `None` for blocks built directly.
    pub(crate) row_order: Option<Vec<[usize; 3]>>,
}

impl BlockVisibility {
    /// Make a fully-populated block. All samples are given unit weight and
    /// zero data.
    pub fn new(
        num_antennas: usize,
        times: Vec<f64>,
        integration_times: Vec<f64>,
        baselines: Vec<Baseline>,
        frequencies: Vec<f64>,
        uvws: Array2<UVW>,
    ) -> Result<BlockVisibility, VisError> {
        if integration_times.len() != times.len() {
            return Err(VisError::LayoutMismatch(format!(
                "{} times but {} integration times",
                times.len(),
                integration_times.len()
            )));
        }
        if uvws.dim() != (times.len(), baselines.len()) {
            return Err(VisError::LayoutMismatch(format!(
                "UVWs have shape {:?}, expected {:?}",
                uvws.dim(),
                (times.len(), baselines.len())
            )));
        }
        if times.windows(2).any(|w| w[0].total_cmp(&w[1]) != Ordering::Less) {
            return Err(VisError::LayoutMismatch(
                "times must be unique and ascending".to_string(),
            ));
        }
        for bl in &baselines {
            let antenna = bl.antenna1.max(bl.antenna2);
            if antenna >= num_antennas {
                return Err(VisError::AntennaOutOfRange {
                    antenna,
                    num_antennas,
                });
            }
        }
        let dim = (times.len(), baselines.len(), frequencies.len());
        Ok(BlockVisibility {
            num_antennas,
            times,
            integration_times,
            baselines,
            frequencies,
            uvws,
            vis: Array3::from_elem(dim, Jones::zero()),
            weights: Array3::ones(dim),
            row_order: None,
        })
    }

    pub fn num_times(&self) -> usize {
        self.times.len()
    }

    pub fn num_baselines(&self) -> usize {
        self.baselines.len()
    }

    pub fn num_chans(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_flagged(&self, i_time: usize, i_bl: usize, i_chan: usize) -> bool {
        is_flagged_weight(self.weights[(i_time, i_bl, i_chan)])
    }

    /// Flag a sample, retaining the magnitude of its weight.
    pub fn flag(&mut self, i_time: usize, i_bl: usize, i_chan: usize) {
        let w = &mut self.weights[(i_time, i_bl, i_chan)];
        *w = -w.abs();
    }

    pub fn zeroed_copy(&self) -> BlockVisibility {
        let mut copy = self.clone();
        copy.vis.fill(Jones::zero());
        copy
    }

    /// Do these visibilities index the same (time, baseline, channel) space as
    /// `other`?
    pub fn same_layout(&self, other: &BlockVisibility) -> bool {
        self.num_antennas == other.num_antennas
            && self.times == other.times
            && self.baselines == other.baselines
            && self.frequencies == other.frequencies
    }

    /// `self - other`, sample by sample.
    pub fn subtract(&self, other: &BlockVisibility) -> Result<BlockVisibility, VisError> {
        if !self.same_layout(other) {
            return Err(VisError::LayoutMismatch(
                "blocks index different times, baselines or channels".to_string(),
            ));
        }
        let mut out = self.clone();
        ndarray::Zip::from(&mut out.vis)
            .and(&mut out.weights)
            .and(&other.vis)
            .and(&other.weights)
            .for_each(|v, w, &ov, &ow| {
                *v -= ov;
                if is_flagged_weight(ow) && *w > 0.0 {
                    *w = -*w;
                }
            });
        Ok(out)
    }

    /// Convert to the flat form. If this block was made by
    /// [`Visibility::to_block`], the original rows are reproduced in their
    /// original order. Otherwise, every sample is emitted in (time, baseline,
    /// channel) order.
    pub fn to_flat(&self) -> Visibility {
        let make_row = |&[i_time, i_bl, i_chan]: &[usize; 3]| VisRow {
            time: self.times[i_time],
            integration_time: self.integration_times[i_time],
            baseline: self.baselines[i_bl],
            channel: i_chan,
            frequency: self.frequencies[i_chan],
            uvw: self.uvws[(i_time, i_bl)],
            vis: self.vis[(i_time, i_bl, i_chan)],
            weight: self.weights[(i_time, i_bl, i_chan)],
        };
        let rows = match &self.row_order {
            Some(order) => order.iter().map(make_row).collect(),
            None => (0..self.num_times())
                .cartesian_product(0..self.num_baselines())
                .cartesian_product(0..self.num_chans())
                .map(|((t, b), c)| make_row(&[t, b, c]))
                .collect(),
        };
        Visibility {
            num_antennas: self.num_antennas,
            rows,
        }
    }
}

/// Visibilities in either representation.
#[derive(Clone, Debug, PartialEq)]
pub enum VisData {
    Flat(Visibility),
    Block(BlockVisibility),
}

impl VisData {
    pub fn is_block(&self) -> bool {
        matches!(self, VisData::Block(_))
    }

    pub fn num_antennas(&self) -> usize {
        match self {
            VisData::Flat(v) => v.num_antennas,
            VisData::Block(b) => b.num_antennas,
        }
    }

    /// Get the block form, converting if necessary.
    pub fn into_block(self) -> Result<BlockVisibility, VisError> {
        match self {
            VisData::Flat(v) => v.to_block(),
            VisData::Block(b) => Ok(b),
        }
    }

    pub fn to_block(&self) -> Result<BlockVisibility, VisError> {
        match self {
            VisData::Flat(v) => v.to_block(),
            VisData::Block(b) => Ok(b.clone()),
        }
    }

    /// Get the flat form, converting if necessary.
    pub fn into_flat(self) -> Visibility {
        match self {
            VisData::Flat(v) => v,
            VisData::Block(b) => b.to_flat(),
        }
    }
}

impl From<Visibility> for VisData {
    fn from(v: Visibility) -> Self {
        VisData::Flat(v)
    }
}

impl From<BlockVisibility> for VisData {
    fn from(b: BlockVisibility) -> Self {
        VisData::Block(b)
    }
}
