//! Periodic Gaussian blur with optional rounding
//!
//! The blur is separable: one 1D correlation per axis with a truncated,
//! normalized Gaussian kernel. Every axis wraps around (the grid is a torus),
//! which is what periodic unit cells need. A kernel longer than an axis keeps
//! wrapping, so the result equals correlating with the kernel folded modulo
//! the axis length.
//!
//! The rounding step comes from a filter that was built for integer label
//! fields. Applied to continuous indicator values it collapses thin features
//! to 0 or 1 and can break exact conservation of the remaining phases, so it
//! is kept as the default for compatibility but can be switched off with
//! [`Rounding::None`].

use log::debug;
use ndarray::{ArrayD, ArrayViewD, Axis};

use super::SpatialFilter;
use crate::error::SmoothError;
use crate::fft::CircularConvolver;

/// Kernels at least this long are applied through the FFT when the backend is `Auto`
const FFT_MIN_KERNEL_LEN: usize = 33;

/// Largest kernel radius, in voxels, that is materialized
pub const MAX_KERNEL_RADIUS: usize = 1 << 20;

/// Post-filter rounding of the output values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rounding {
    /// Round to the nearest integer, ties to even (NumPy `round` semantics)
    #[default]
    NearestEven,
    /// Keep the continuous filter output
    None,
}

/// How each 1D periodic correlation is evaluated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConvolutionBackend {
    /// Direct sum for short kernels, FFT for long ones
    #[default]
    Auto,
    Direct,
    Fft,
}

/// Parameters for the periodic Gaussian filter
#[derive(Clone, Debug)]
pub struct GaussianFilter {
    /// Kernel radius in units of sigma (default 4.0)
    pub truncate: f64,
    /// Rounding applied after filtering (default nearest-even)
    pub rounding: Rounding,
    pub backend: ConvolutionBackend,
}

impl Default for GaussianFilter {
    fn default() -> Self {
        Self {
            truncate: 4.0,
            rounding: Rounding::NearestEven,
            backend: ConvolutionBackend::Auto,
        }
    }
}

impl SpatialFilter for GaussianFilter {
    fn apply(&self, field: ArrayViewD<'_, f64>, strength: f64) -> Result<ArrayD<f64>, SmoothError> {
        let mut out = gaussian_filter_wrap(field, strength, self.truncate, self.backend)?;
        if self.rounding == Rounding::NearestEven {
            out.mapv_inplace(f64::round_ties_even);
        }
        Ok(out)
    }
}

/// Normalized 1D Gaussian kernel of length `2r + 1`, `r = floor(truncate * sigma + 0.5)`
///
/// Entry `t` holds the weight for offset `t - r`.
pub fn gaussian_kernel_1d(sigma: f64, truncate: f64) -> Result<Vec<f64>, SmoothError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(SmoothError::InvalidArgument(format!(
            "smoothing strength must be a positive finite number, got {}",
            sigma
        )));
    }
    if !truncate.is_finite() || truncate <= 0.0 {
        return Err(SmoothError::InvalidArgument(format!(
            "kernel truncation must be a positive finite number, got {}",
            truncate
        )));
    }

    let reach = (truncate * sigma + 0.5).floor();
    if reach > MAX_KERNEL_RADIUS as f64 {
        return Err(SmoothError::InvalidArgument(format!(
            "kernel radius {} for strength {} exceeds the limit of {} voxels",
            reach, sigma, MAX_KERNEL_RADIUS
        )));
    }
    let radius = reach as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|t| {
            let x = t as f64 - radius as f64;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }

    Ok(kernel)
}

/// Fold a centered correlation kernel onto a period of length `n`
///
/// Returns the circular convolution kernel `c` with
/// `sum_t w[t] * x[(i + t - r) mod n] == sum_d c[d] * x[(i - d) mod n]`.
pub fn fold_periodic(weights: &[f64], n: usize) -> Vec<f64> {
    let mut folded = vec![0.0; n];
    if n == 0 {
        return folded;
    }
    let radius = (weights.len() / 2) as isize;
    for (t, &w) in weights.iter().enumerate() {
        let d = (radius - t as isize).rem_euclid(n as isize) as usize;
        folded[d] += w;
    }
    folded
}

/// Isotropic Gaussian blur with wrap-around boundaries on every axis
///
/// No rounding is applied here; see [`GaussianFilter`] for the full filter.
pub fn gaussian_filter_wrap(
    field: ArrayViewD<'_, f64>,
    sigma: f64,
    truncate: f64,
    backend: ConvolutionBackend,
) -> Result<ArrayD<f64>, SmoothError> {
    let weights = gaussian_kernel_1d(sigma, truncate)?;
    let mut out = field.to_owned();

    for ax in 0..out.ndim() {
        let n = out.len_of(Axis(ax));
        let use_fft = match backend {
            ConvolutionBackend::Direct => false,
            ConvolutionBackend::Fft => true,
            ConvolutionBackend::Auto => weights.len() >= FFT_MIN_KERNEL_LEN,
        };
        debug!(
            "gaussian: axis {} (n={}), kernel length {}, {}",
            ax,
            n,
            weights.len(),
            if use_fft { "fft" } else { "direct" }
        );
        if use_fft {
            convolve_axis_fft(&mut out, Axis(ax), &weights);
        } else {
            correlate_axis_wrap(&mut out, Axis(ax), &weights);
        }
    }

    Ok(out)
}

/// Direct periodic correlation of every lane along `axis`
fn correlate_axis_wrap(field: &mut ArrayD<f64>, axis: Axis, weights: &[f64]) {
    let n = field.len_of(axis);
    if n == 0 {
        return;
    }
    let radius = (weights.len() / 2) as isize;
    let mut line = vec![0.0f64; n];

    for mut lane in field.lanes_mut(axis) {
        for (dst, &src) in line.iter_mut().zip(lane.iter()) {
            *dst = src;
        }

        for (i, out) in lane.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (t, &w) in weights.iter().enumerate() {
                let offset = i as isize + t as isize - radius;
                sum += w * line[offset.rem_euclid(n as isize) as usize];
            }
            *out = sum;
        }
    }
}

/// Periodic correlation of every lane along `axis` through the FFT
fn convolve_axis_fft(field: &mut ArrayD<f64>, axis: Axis, weights: &[f64]) {
    let n = field.len_of(axis);
    if n == 0 {
        return;
    }
    let mut conv = CircularConvolver::new(&fold_periodic(weights, n));
    let mut line = vec![0.0f64; n];

    for mut lane in field.lanes_mut(axis) {
        for (dst, &src) in line.iter_mut().zip(lane.iter()) {
            *dst = src;
        }
        conv.convolve_inplace(&mut line);
        for (dst, &src) in lane.iter_mut().zip(line.iter()) {
            *dst = src;
        }
    }
}
