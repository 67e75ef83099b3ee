// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    c64,
    simulate::{simulate_visibility, ObservationLayout},
};

fn small_vis() -> Visibility {
    let layout = ObservationLayout::new(4, 3, 2.0, vec![150e6, 151e6]);
    let mut vis = simulate_visibility(&layout);
    for (i, row) in vis.rows.iter_mut().enumerate() {
        row.vis = Jones::from([
            c64::new(i as f64, 1.0),
            c64::new(0.1, -(i as f64)),
            c64::new(-0.2, 0.3),
            c64::new(2.0 * i as f64, 0.0),
        ]);
        row.weight = 1.0 + (i % 3) as f64;
    }
    vis
}

#[test]
fn test_round_trip_preserves_order_and_values() {
    let vis = small_vis();
    let block = vis.to_block().unwrap();
    assert_eq!(block.vis.dim(), (3, 6, 2));
    assert_eq!(block.to_flat(), vis);
}

#[test]
fn test_round_trip_shuffled_with_gaps_and_flags() {
    let mut vis = small_vis();
    // Reverse the row order, drop some samples and flag another.
    vis.rows.reverse();
    vis.rows.remove(5);
    vis.rows.remove(17);
    vis.rows[3].weight = -2.0;
    let block = vis.to_block().unwrap();
    assert_eq!(block.to_flat(), vis);

    // The missing sample is held with zero weight.
    let missing = block.weights.iter().filter(|&&w| w == 0.0).count();
    assert_eq!(missing, 2);
}

#[test]
fn test_duplicate_sample_is_an_error() {
    let mut vis = small_vis();
    let dup = vis.rows[4];
    vis.rows.push(dup);
    assert!(matches!(
        vis.to_block(),
        Err(VisError::DuplicateSample { .. })
    ));
}

#[test]
fn test_inconsistent_frequency_is_an_error() {
    let mut vis = small_vis();
    vis.rows[1].frequency += 1.0;
    assert!(matches!(
        vis.to_block(),
        Err(VisError::InconsistentFrequency { channel: 1, .. })
    ));
}

#[test]
fn test_antenna_out_of_range() {
    let mut vis = small_vis();
    vis.num_antennas = 3;
    assert!(matches!(
        vis.to_block(),
        Err(VisError::AntennaOutOfRange { antenna: 3, .. })
    ));
}

#[test]
fn test_subtract_carries_flags() {
    let vis = small_vis();
    let mut model = vis.zeroed_copy();
    model.rows[2].vis = Jones::identity();
    model.rows[7].weight = -1.0;
    let residual = vis.subtract(&model).unwrap();
    assert_abs_diff_eq!(
        residual.rows[2].vis,
        vis.rows[2].vis - Jones::identity(),
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(residual.rows[0].vis, vis.rows[0].vis, epsilon = 1e-12);
    assert!(residual.rows[7].is_flagged());
    assert!(!residual.rows[6].is_flagged());

    let block = vis.to_block().unwrap();
    let model_block = model.to_block().unwrap();
    let block_residual = block.subtract(&model_block).unwrap();
    assert_eq!(block_residual.to_flat(), residual);
}

#[test]
fn test_subtract_layout_mismatch() {
    let vis = small_vis();
    let mut other = vis.clone();
    other.rows.pop();
    assert!(vis.subtract(&other).is_err());
}

#[test]
fn test_directly_built_block_flattens_canonically() {
    let baselines = vec![Baseline::new(0, 1), Baseline::new(0, 2), Baseline::new(1, 2)];
    let block = BlockVisibility::new(
        3,
        vec![1.0, 2.0],
        vec![1.0, 1.0],
        baselines.clone(),
        vec![100e6],
        Array2::from_elem((2, 3), UVW::default()),
    )
    .unwrap();
    let flat = block.to_flat();
    assert_eq!(flat.len(), 6);
    assert_eq!(flat.rows[0].baseline, baselines[0]);
    assert_abs_diff_eq!(flat.rows[3].time, 2.0);
    assert_eq!(flat.rows[5].baseline, baselines[2]);
    assert_eq!(flat.to_block().unwrap().to_flat(), flat);
}

#[test]
fn test_unsorted_times_rejected() {
    let result = BlockVisibility::new(
        2,
        vec![2.0, 1.0],
        vec![1.0, 1.0],
        vec![Baseline::new(0, 1)],
        vec![100e6],
        Array2::from_elem((2, 1), UVW::default()),
    );
    assert!(result.is_err());
}

#[test]
fn test_vis_data_conversions() {
    let vis = small_vis();
    let data = VisData::from(vis.clone());
    assert!(!data.is_block());
    let block = data.into_block().unwrap();
    let data = VisData::from(block);
    assert!(data.is_block());
    assert_eq!(data.num_antennas(), 4);
    assert_eq!(data.into_flat(), vis);
}

#[test]
fn test_flag_negates_weight() {
    let mut block = small_vis().to_block().unwrap();
    let w = block.weights[(0, 1, 1)];
    block.flag(0, 1, 1);
    assert!(block.is_flagged(0, 1, 1));
    assert_abs_diff_eq!(block.weights[(0, 1, 1)], -w);
    block.flag(0, 1, 1);
    assert_abs_diff_eq!(block.weights[(0, 1, 1)], -w);
}
