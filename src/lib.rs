//! mcr-smooth: volume-conserving smoothing of voxelized microstructures
//!
//! Reduces discretization artifacts in 2D/3D multiphase microstructures while
//! keeping the phase indicator functions summing to one in every voxel.
//!
//! # Modules
//! - `smooth`: multiphase smoother (dominant phase rebuilt as the complement)
//! - `filter`: spatial filters (periodic Gaussian with rounding)
//! - `fft`: circular convolution along one axis using rustfft
//! - `microstructure`: labeled / one-hot / grayscale microstructure container
//! - `npy_io`: NumPy `.npy` load and save
//! - `error`: error type

// Core modules
pub mod error;
pub mod fft;

// Algorithm modules
pub mod filter;
pub mod smooth;

// Data model
pub mod microstructure;

// I/O modules
pub mod npy_io;

pub use error::SmoothError;
pub use filter::{GaussianFilter, Rounding, SmoothingMethod, SpatialFilter};
pub use microstructure::{Microstructure, MultiphaseEncoding};
pub use smooth::{dominant_phase, smooth, smooth_multiphase, smooth_with, volume_fractions, SmoothParams};
