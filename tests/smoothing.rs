//! Properties of the multiphase smoother on 2D and 3D microstructures

mod common;

use common::{assert_phase_sums_to_one, block_labels_2d, max_abs_diff, roll, sphere_labels_3d};
use mcr_smooth::filter::{ConvolutionBackend, GaussianFilter};
use mcr_smooth::{
    smooth, smooth_multiphase, smooth_with, volume_fractions, Microstructure, Rounding, SmoothError,
    SmoothParams,
};
use ndarray::{ArrayD, Axis, IxDyn};

#[test]
fn test_small_inclusion_vanishes() {
    // 2x2 inclusion (vf 0.25) in a 4x4 periodic grid: its blur peaks at ~0.42
    // and rounds away entirely, the matrix takes over every voxel
    let mut ms = Microstructure::from_labels(block_labels_2d(4, 2, 0, 1)).unwrap();
    ms.set_use_multiphase(true);
    assert_eq!(ms.volume_fractions().unwrap(), vec![0.25, 0.75]);

    smooth(&mut ms, "gaussian", 1.0).unwrap();

    let encoded = ms.multiphase_array().unwrap();
    assert_eq!(encoded.shape(), &[4, 4, 2]);
    assert_phase_sums_to_one(&encoded, 1e-9);
    assert!(encoded.index_axis(Axis(2), 0).iter().all(|&v| v == 0.0));
    assert!(encoded.index_axis(Axis(2), 1).iter().all(|&v| v == 1.0));
    assert!(ms.decode_labels().unwrap().iter().all(|&l| l == 1));
}

#[test]
fn test_square_corners_are_rounded_off() {
    // 4x4 square in an 8x8 grid: corners fall below 0.5 after blurring
    let mut ms = Microstructure::from_labels(block_labels_2d(8, 4, 0, 1)).unwrap();
    smooth(&mut ms, "gaussian", 1.0).unwrap();

    let labels = ms.decode_labels().unwrap();
    let inclusion = labels.iter().filter(|&&l| l == 0).count();
    assert_eq!(inclusion, 12);
    for &(i, j) in &[(0, 0), (0, 3), (3, 0), (3, 3)] {
        assert_eq!(labels[[i, j]], 1, "corner ({}, {}) should belong to the matrix", i, j);
    }
    for &(i, j) in &[(1, 1), (1, 2), (2, 1), (2, 2), (0, 1), (3, 2)] {
        assert_eq!(labels[[i, j]], 0, "voxel ({}, {}) should stay in the inclusion", i, j);
    }
}

#[test]
fn test_conservation_3d_three_phases() {
    let labels = sphere_labels_3d(10, (3.0, 4.0, 5.0), 2.5);
    let encoded = Microstructure::from_labels(labels).unwrap().multiphase_array().unwrap();

    for rounding in [Rounding::NearestEven, Rounding::None] {
        let filter = GaussianFilter {
            rounding,
            ..GaussianFilter::default()
        };
        let out = smooth_multiphase(encoded.view(), &filter, 0.8).unwrap();
        assert_eq!(out.shape(), encoded.shape());
        assert_phase_sums_to_one(&out, 1e-9);
    }
}

#[test]
fn test_unrounded_smoothing_keeps_volume_fractions() {
    let labels = sphere_labels_3d(9, (4.0, 4.0, 4.0), 3.0);
    let encoded = Microstructure::from_labels(labels).unwrap().multiphase_array().unwrap();
    let filter = GaussianFilter {
        rounding: Rounding::None,
        ..GaussianFilter::default()
    };
    let out = smooth_multiphase(encoded.view(), &filter, 1.2).unwrap();

    let before = volume_fractions(encoded.view());
    let after = volume_fractions(out.view());
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-12, "volume fraction {} became {}", a, b);
    }
}

#[test]
fn test_dominant_phase_untouched_when_others_empty() {
    let indices = ArrayD::from_elem(IxDyn(&[6, 5]), 2usize);
    let mut ms = Microstructure::from_labels_with_phases(indices, 4).unwrap();
    ms.set_use_multiphase(true);
    let before = ms.multiphase_array().unwrap();

    smooth(&mut ms, "gaussian", 2.0).unwrap();

    assert_eq!(ms.multiphase_array().unwrap(), before);
}

#[test]
fn test_repeated_runs_are_identical() {
    let labels = sphere_labels_3d(8, (2.0, 5.0, 3.0), 2.0);
    let run = || {
        let mut ms = Microstructure::from_labels(labels.clone()).unwrap();
        ms.set_use_multiphase(true);
        smooth(&mut ms, "gaussian", 1.0).unwrap();
        ms.multiphase_array().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_periodic_shift_commutes_with_smoothing() {
    let labels = sphere_labels_3d(8, (2.0, 2.0, 6.0), 2.2);
    let encoded = Microstructure::from_labels(labels).unwrap().multiphase_array().unwrap();
    let shifts = [3, -2, 5, 0];
    let shifted = roll(&encoded, &shifts);

    let filter = GaussianFilter::default();
    let smoothed_then_shifted = roll(&smooth_multiphase(encoded.view(), &filter, 1.0).unwrap(), &shifts);
    let shifted_then_smoothed = smooth_multiphase(shifted.view(), &filter, 1.0).unwrap();

    assert!(max_abs_diff(&smoothed_then_shifted, &shifted_then_smoothed) < 1e-12);
}

#[test]
fn test_fft_backend_matches_direct() {
    let labels = sphere_labels_3d(12, (6.0, 5.0, 4.0), 3.5);
    let encoded = Microstructure::from_labels(labels).unwrap().multiphase_array().unwrap();
    let direct = GaussianFilter {
        rounding: Rounding::None,
        backend: ConvolutionBackend::Direct,
        ..GaussianFilter::default()
    };
    let fft = GaussianFilter {
        backend: ConvolutionBackend::Fft,
        ..direct.clone()
    };

    // strength 5 gives a 41-tap kernel, longer than every axis
    for strength in [0.9, 5.0] {
        let a = smooth_multiphase(encoded.view(), &direct, strength).unwrap();
        let b = smooth_multiphase(encoded.view(), &fft, strength).unwrap();
        assert!(max_abs_diff(&a, &b) < 1e-12, "strength {}", strength);
    }
}

#[test]
fn test_grayscale_rejected_without_mutation() {
    let field = ArrayD::from_shape_fn(IxDyn(&[5, 5]), |idx| (idx[0] * 5 + idx[1]) as f64 / 25.0);
    let mut ms = Microstructure::from_grayscale(field.clone()).unwrap();

    let err = smooth(&mut ms, "gaussian", 1.0).unwrap_err();
    assert!(matches!(err, SmoothError::PreconditionViolation(_)));
    assert_eq!(ms.grayscale().unwrap(), field.view());
}

#[test]
fn test_unknown_method_rejected_without_mutation() {
    let labels = block_labels_2d(6, 3, 4, 9);
    let mut ms = Microstructure::from_labels(labels.clone()).unwrap();

    match smooth(&mut ms, "bogus", 1.0) {
        Err(SmoothError::UnsupportedMethod(name)) => assert_eq!(name, "bogus"),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert_eq!(ms.decode_labels().unwrap(), labels);
}

#[test]
fn test_smooth_with_params() {
    let mut ms = Microstructure::from_labels(block_labels_2d(8, 4, 0, 1)).unwrap();
    ms.set_use_multiphase(true);
    let params = SmoothParams {
        rounding: Rounding::None,
        strength: 0.7,
        ..SmoothParams::default()
    };
    smooth_with(&mut ms, &params).unwrap();

    let encoded = ms.multiphase_array().unwrap();
    assert_phase_sums_to_one(&encoded, 1e-9);
    // continuous output: some voxels are strictly between 0 and 1
    assert!(encoded.iter().any(|&v| v > 0.0 && v < 1.0));
}
