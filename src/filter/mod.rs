//! Spatial filters applied to single-phase indicator fields
//!
//! The smoother only sees the [`SpatialFilter`] seam: a pure function from
//! (field, strength) to a field of the same shape. [`SmoothingMethod`] is the
//! closed set of named filters selectable from the command line.
//! - `gaussian`: periodic Gaussian blur followed by rounding

pub mod gaussian;

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, ArrayViewD};

use crate::error::SmoothError;

pub use gaussian::{
    fold_periodic, gaussian_filter_wrap, gaussian_kernel_1d, ConvolutionBackend, GaussianFilter,
    Rounding, MAX_KERNEL_RADIUS,
};

/// A filter over a 2D/3D real-valued field
pub trait SpatialFilter {
    /// Filter `field` with the given `strength`, returning an array of the same shape
    fn apply(&self, field: ArrayViewD<'_, f64>, strength: f64) -> Result<ArrayD<f64>, SmoothError>;
}

impl<F> SpatialFilter for F
where
    F: Fn(ArrayViewD<'_, f64>, f64) -> Result<ArrayD<f64>, SmoothError>,
{
    fn apply(&self, field: ArrayViewD<'_, f64>, strength: f64) -> Result<ArrayD<f64>, SmoothError> {
        self(field, strength)
    }
}

/// Named smoothing methods
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmoothingMethod {
    #[default]
    Gaussian,
}

impl SmoothingMethod {
    pub const ALL: [SmoothingMethod; 1] = [SmoothingMethod::Gaussian];

    pub fn name(self) -> &'static str {
        match self {
            SmoothingMethod::Gaussian => "gaussian",
        }
    }

    /// Build the filter implementing this method
    pub fn filter(self, truncate: f64, rounding: Rounding) -> Box<dyn SpatialFilter> {
        match self {
            SmoothingMethod::Gaussian => Box::new(GaussianFilter {
                truncate,
                rounding,
                ..GaussianFilter::default()
            }),
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SmoothingMethod {
    type Err = SmoothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SmoothingMethod::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| SmoothError::UnsupportedMethod(s.to_string()))
    }
}
