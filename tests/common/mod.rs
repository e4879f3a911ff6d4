//! Common test utilities for mcr-smooth integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use ndarray::{Array2, Array3, ArrayD, Axis};

/// Square block of `label_in` in the corner of an n x n grid of `label_out`
pub fn block_labels_2d(n: usize, size: usize, label_in: i64, label_out: i64) -> ArrayD<i64> {
    Array2::from_shape_fn((n, n), |(i, j)| if i < size && j < size { label_in } else { label_out })
        .into_dyn()
}

/// Three-phase 3D phantom: a sphere (phase 1), thin oblique sheets (phase 2), matrix (phase 0)
pub fn sphere_labels_3d(n: usize, center: (f64, f64, f64), radius: f64) -> ArrayD<i64> {
    let r2 = radius * radius;
    Array3::from_shape_fn((n, n, n), |(i, j, k)| {
        let dx = i as f64 - center.0;
        let dy = j as f64 - center.1;
        let dz = k as f64 - center.2;
        if dx * dx + dy * dy + dz * dz <= r2 {
            1
        } else if (i + 2 * j + 3 * k) % 7 == 0 {
            2
        } else {
            0
        }
    })
    .into_dyn()
}

/// Periodic shift of the leading `shifts.len()` axes
pub fn roll(array: &ArrayD<f64>, shifts: &[isize]) -> ArrayD<f64> {
    let shape = array.shape().to_vec();
    ArrayD::from_shape_fn(array.raw_dim(), |idx| {
        let src: Vec<usize> = (0..shape.len())
            .map(|d| {
                let shift = shifts.get(d).copied().unwrap_or(0);
                (idx[d] as isize - shift).rem_euclid(shape[d] as isize) as usize
            })
            .collect();
        array[&src[..]]
    })
}

/// Assert every voxel's indicator values sum to one (phase axis last)
pub fn assert_phase_sums_to_one(encoded: &ArrayD<f64>, tol: f64) {
    let phase_axis = Axis(encoded.ndim() - 1);
    for (i, total) in encoded.sum_axis(phase_axis).iter().enumerate() {
        assert!((total - 1.0).abs() < tol, "voxel {}: phase sum {} != 1", i, total);
    }
}

/// Max absolute difference between two arrays of the same shape
pub fn max_abs_diff(a: &ArrayD<f64>, b: &ArrayD<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Unique path in the system temp directory
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mcr_smooth_{}_{}", std::process::id(), name))
}
