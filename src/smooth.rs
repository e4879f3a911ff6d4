//! Volume-conserving smoothing of multiphase microstructures
//!
//! Every phase except the dominant one (largest volume fraction) is filtered
//! independently; the dominant phase is then rebuilt as the complement of the
//! others, so the indicator functions still sum to one in every voxel.

use log::{debug, info, warn};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::error::SmoothError;
use crate::filter::{Rounding, SmoothingMethod, SpatialFilter};
use crate::microstructure::{first_argmax, Microstructure};

/// Parameters for [`smooth_with`]
#[derive(Clone, Debug)]
pub struct SmoothParams {
    /// Filter to apply to the non-dominant phases (default Gaussian)
    pub method: SmoothingMethod,
    /// Filter strength; standard deviation in voxels for the Gaussian (default 1.0)
    pub strength: f64,
    /// Gaussian kernel radius in units of the strength (default 4.0)
    pub truncate: f64,
    /// Rounding after filtering (default nearest-even)
    pub rounding: Rounding,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::Gaussian,
            strength: 1.0,
            truncate: 4.0,
            rounding: Rounding::NearestEven,
        }
    }
}

/// Smooth a microstructure in place with a named method
///
/// # Errors
/// - `PreconditionViolation` if the microstructure has no phases
/// - `UnsupportedMethod` if `method` names no known filter
/// - `InvalidArgument` if `strength` is not a positive finite number
///
/// The microstructure is left untouched on every error.
pub fn smooth<'m>(
    microstructure: &'m mut Microstructure,
    method: &str,
    strength: f64,
) -> Result<&'m mut Microstructure, SmoothError> {
    require_phases(microstructure)?;
    let params = SmoothParams {
        method: method.parse()?,
        strength,
        ..SmoothParams::default()
    };
    smooth_phases(microstructure, &params)
}

/// Smooth a microstructure in place with explicit parameters
pub fn smooth_with<'m>(
    microstructure: &'m mut Microstructure,
    params: &SmoothParams,
) -> Result<&'m mut Microstructure, SmoothError> {
    require_phases(microstructure)?;
    smooth_phases(microstructure, params)
}

/// Validates the parameters and runs the smoother; phases were already checked
fn smooth_phases<'m>(
    microstructure: &'m mut Microstructure,
    params: &SmoothParams,
) -> Result<&'m mut Microstructure, SmoothError> {
    if !params.strength.is_finite() || params.strength <= 0.0 {
        return Err(SmoothError::InvalidArgument(format!(
            "smoothing strength must be a positive finite number, got {}",
            params.strength
        )));
    }
    if !params.truncate.is_finite() || params.truncate <= 0.0 {
        return Err(SmoothError::InvalidArgument(format!(
            "kernel truncation must be a positive finite number, got {}",
            params.truncate
        )));
    }

    let filter = params.method.filter(params.truncate, params.rounding);
    microstructure.with_multiphase_encoding(|x| {
        let smoothed = smooth_multiphase(x.view(), filter.as_ref(), params.strength)?;
        x.assign(smoothed)
    })?;

    info!(
        "smoothed {:?} microstructure with {} phases ({}, strength {})",
        microstructure.spatial_shape(),
        microstructure.n_phases(),
        params.method,
        params.strength
    );
    Ok(microstructure)
}

fn require_phases(microstructure: &Microstructure) -> Result<(), SmoothError> {
    if microstructure.has_phases() {
        Ok(())
    } else {
        Err(SmoothError::PreconditionViolation(
            "smoothing requires a microstructure with discrete phases".to_string(),
        ))
    }
}

/// Volume fraction of every phase of a one-hot encoding (phase axis last)
pub fn volume_fractions(encoded: ArrayViewD<'_, f64>) -> Vec<f64> {
    if encoded.ndim() == 0 {
        return Vec::new();
    }
    let phase_axis = Axis(encoded.ndim() - 1);
    encoded
        .axis_iter(phase_axis)
        .map(|indicator| indicator.mean().unwrap_or(0.0))
        .collect()
}

/// Phase with the largest volume fraction; the first one wins on ties
pub fn dominant_phase(fractions: &[f64]) -> Option<usize> {
    first_argmax(fractions.iter().copied())
}

/// Smooth a one-hot encoding, returning a new encoding of the same shape
///
/// Non-dominant phases are filtered with `filter`; the dominant phase becomes
/// `1 - sum(filtered phases)`.
pub fn smooth_multiphase(
    encoded: ArrayViewD<'_, f64>,
    filter: &dyn SpatialFilter,
    strength: f64,
) -> Result<ArrayD<f64>, SmoothError> {
    if encoded.ndim() < 2 {
        return Err(SmoothError::InvalidShape(format!(
            "multiphase encoding needs spatial axes and a phase axis, got shape {:?}",
            encoded.shape()
        )));
    }
    let phase_axis = Axis(encoded.ndim() - 1);
    let spatial_shape = &encoded.shape()[..encoded.ndim() - 1];

    let fractions = volume_fractions(encoded.view());
    let largest_phase = dominant_phase(&fractions)
        .ok_or_else(|| SmoothError::InvalidShape("multiphase encoding has zero phases".to_string()))?;
    debug!("volume fractions {:?}, dominant phase {}", fractions, largest_phase);

    let mut smoothed = ArrayD::<f64>::zeros(encoded.raw_dim());
    let mut largest_indicator = ArrayD::<f64>::ones(IxDyn(spatial_shape));

    for (phase, indicator) in encoded.axis_iter(phase_axis).enumerate() {
        if phase == largest_phase {
            continue;
        }
        let filtered = filter.apply(indicator, strength)?;
        if filtered.shape() != spatial_shape {
            return Err(SmoothError::ShapeMismatch {
                expected: spatial_shape.to_vec(),
                actual: filtered.shape().to_vec(),
            });
        }
        largest_indicator -= &filtered;
        smoothed.index_axis_mut(phase_axis, phase).assign(&filtered);
    }

    let negative = largest_indicator.iter().filter(|&&v| v < 0.0).count();
    if negative > 0 {
        warn!(
            "dominant phase {} has {} voxels with negative indicator after smoothing",
            largest_phase, negative
        );
    }
    smoothed.index_axis_mut(phase_axis, largest_phase).assign(&largest_indicator);

    Ok(smoothed)
}
