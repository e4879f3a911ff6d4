//! Voxelized microstructure with discrete phases
//!
//! A [`Microstructure`] owns a 2D or 3D field in one of three forms:
//! - phase labels (one phase index per voxel)
//! - a multiphase (one-hot) encoding with the phase axis last
//! - a grayscale field without phase information
//!
//! Algorithms that work on indicator functions borrow the one-hot encoding
//! through [`MultiphaseEncoding`], a guard that writes an assigned array back
//! into the microstructure only when it is committed.

use std::collections::BTreeSet;
use std::path::Path;

use log::debug;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::error::SmoothError;
use crate::npy_io;

#[derive(Clone, Debug)]
enum Field {
    /// Phase index per voxel, shape = spatial shape
    Labels(ArrayD<usize>),
    /// One-hot encoding, shape = spatial shape + (n_phases,)
    Multiphase(ArrayD<f64>),
    Grayscale(ArrayD<f64>),
}

/// A 2D or 3D microstructure
#[derive(Clone, Debug)]
pub struct Microstructure {
    field: Field,
    spatial_shape: Vec<usize>,
    /// Original label value of each phase index, ascending
    phase_labels: Vec<i64>,
    use_multiphase: bool,
}

/// Index of the first maximum; `None` for an empty sequence
pub(crate) fn first_argmax<I: IntoIterator<Item = f64>>(values: I) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.into_iter().enumerate() {
        let better = match best {
            Some((_, b)) => v > b,
            None => true,
        };
        if better {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

fn check_spatial_shape(shape: &[usize]) -> Result<(), SmoothError> {
    if shape.len() != 2 && shape.len() != 3 {
        return Err(SmoothError::InvalidShape(format!(
            "expected a 2D or 3D microstructure, got {}D shape {:?}",
            shape.len(),
            shape
        )));
    }
    if shape.iter().any(|&d| d == 0) {
        return Err(SmoothError::InvalidShape(format!(
            "microstructure has an empty dimension: {:?}",
            shape
        )));
    }
    Ok(())
}

fn encode_one_hot(labels: &ArrayD<usize>, n_phases: usize) -> ArrayD<f64> {
    let mut shape = labels.shape().to_vec();
    let phase_axis = Axis(shape.len());
    shape.push(n_phases);

    let mut encoded = ArrayD::<f64>::zeros(IxDyn(&shape));
    for phase in 0..n_phases {
        encoded
            .index_axis_mut(phase_axis, phase)
            .zip_mut_with(labels, |e, &l| {
                if l == phase {
                    *e = 1.0;
                }
            });
    }
    encoded
}

fn decode_one_hot(encoded: ArrayViewD<'_, f64>) -> ArrayD<usize> {
    let phase_axis = Axis(encoded.ndim() - 1);
    encoded.map_axis(phase_axis, |lane| first_argmax(lane.iter().copied()).unwrap_or(0))
}

impl Microstructure {
    /// Build from a label field; phases are the distinct label values in ascending order
    pub fn from_labels(labels: ArrayD<i64>) -> Result<Self, SmoothError> {
        check_spatial_shape(labels.shape())?;

        let phase_labels: Vec<i64> = labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // every label is present in phase_labels, so the search always succeeds
        let indices = labels.mapv(|l| phase_labels.binary_search(&l).unwrap_or(0));

        Ok(Self {
            spatial_shape: labels.shape().to_vec(),
            field: Field::Labels(indices),
            phase_labels,
            use_multiphase: false,
        })
    }

    /// Build from phase indices in `0..n_phases`; phases may be empty
    pub fn from_labels_with_phases(indices: ArrayD<usize>, n_phases: usize) -> Result<Self, SmoothError> {
        check_spatial_shape(indices.shape())?;
        if n_phases == 0 {
            return Err(SmoothError::InvalidArgument("n_phases must be at least 1".to_string()));
        }
        if let Some(&bad) = indices.iter().find(|&&p| p >= n_phases) {
            return Err(SmoothError::InvalidArgument(format!(
                "phase index {} out of range for {} phases",
                bad, n_phases
            )));
        }

        Ok(Self {
            spatial_shape: indices.shape().to_vec(),
            field: Field::Labels(indices),
            phase_labels: (0..n_phases as i64).collect(),
            use_multiphase: false,
        })
    }

    /// Build from a one-hot encoding whose last axis is the phase axis
    pub fn from_multiphase(encoded: ArrayD<f64>) -> Result<Self, SmoothError> {
        let shape = encoded.shape();
        if shape.is_empty() {
            return Err(SmoothError::InvalidShape("multiphase array has no phase axis".to_string()));
        }
        let (spatial, n_phases) = (&shape[..shape.len() - 1], shape[shape.len() - 1]);
        check_spatial_shape(spatial)?;
        if n_phases == 0 {
            return Err(SmoothError::InvalidShape("multiphase array has zero phases".to_string()));
        }

        Ok(Self {
            spatial_shape: spatial.to_vec(),
            phase_labels: (0..n_phases as i64).collect(),
            field: Field::Multiphase(encoded),
            use_multiphase: true,
        })
    }

    /// Build a microstructure without phase information
    pub fn from_grayscale(field: ArrayD<f64>) -> Result<Self, SmoothError> {
        check_spatial_shape(field.shape())?;
        Ok(Self {
            spatial_shape: field.shape().to_vec(),
            field: Field::Grayscale(field),
            phase_labels: Vec::new(),
            use_multiphase: false,
        })
    }

    /// Build from raw values as loaded from an array file
    ///
    /// Integral data (integer dtype, or floats that are all whole numbers) is
    /// read as phase labels; anything else becomes a grayscale field.
    pub fn from_array(values: ArrayD<f64>, integral: bool, use_multiphase: bool) -> Result<Self, SmoothError> {
        let is_labels = integral || values.iter().all(|v| v.is_finite() && v.fract() == 0.0);

        let mut ms = if is_labels {
            Self::from_labels(values.mapv(|v| v as i64))?
        } else {
            debug!("non-integral values, loading {:?} as grayscale", values.shape());
            Self::from_grayscale(values)?
        };
        if use_multiphase {
            ms.set_use_multiphase(true);
        }
        Ok(ms)
    }

    /// Load a microstructure from a `.npy` (or gzip-compressed `.npy.gz`) file
    pub fn from_npy(path: &Path, use_multiphase: bool) -> Result<Self, SmoothError> {
        let npy = npy_io::read_npy_file(path)?;
        debug!(
            "loaded {} with dtype {} and shape {:?}",
            path.display(),
            npy.dtype,
            npy.data.shape()
        );
        Self::from_array(npy.data, npy.dtype.is_integral(), use_multiphase)
    }

    /// Save the decoded label field (or the grayscale field) to a `.npy` file
    pub fn to_npy(&self, path: &Path) -> Result<(), SmoothError> {
        match &self.field {
            Field::Grayscale(values) => npy_io::save_npy_to_file(path, values.view()),
            _ => {
                let labels = self.decode_labels()?;
                npy_io::save_npy_to_file(path, labels.view())
            }
        }
    }

    /// Whether the microstructure has discrete phase labels
    pub fn has_phases(&self) -> bool {
        !matches!(self.field, Field::Grayscale(_))
    }

    pub fn n_phases(&self) -> usize {
        self.phase_labels.len()
    }

    /// Spatial dimensions, excluding the phase axis
    pub fn spatial_shape(&self) -> &[usize] {
        &self.spatial_shape
    }

    pub fn is_3d(&self) -> bool {
        self.spatial_shape.len() == 3
    }

    /// Original label value of each phase index
    pub fn phase_labels(&self) -> &[i64] {
        &self.phase_labels
    }

    /// Whether the canonical storage is the one-hot encoding
    pub fn use_multiphase(&self) -> bool {
        self.use_multiphase
    }

    /// Switch the canonical storage between labels and the one-hot encoding
    pub fn set_use_multiphase(&mut self, use_multiphase: bool) {
        if !self.has_phases() || self.use_multiphase == use_multiphase {
            self.use_multiphase = use_multiphase && self.has_phases();
            return;
        }
        let n_phases = self.n_phases();
        self.field = match std::mem::replace(&mut self.field, Field::Labels(ArrayD::zeros(IxDyn(&[])))) {
            Field::Labels(labels) if use_multiphase => Field::Multiphase(encode_one_hot(&labels, n_phases)),
            Field::Multiphase(encoded) if !use_multiphase => Field::Labels(decode_one_hot(encoded.view())),
            other => other,
        };
        self.use_multiphase = use_multiphase;
    }

    /// The grayscale field, if this microstructure has no phases
    pub fn grayscale(&self) -> Option<ArrayViewD<'_, f64>> {
        match &self.field {
            Field::Grayscale(values) => Some(values.view()),
            _ => None,
        }
    }

    /// A copy of the one-hot encoding, shape `spatial_shape + (n_phases,)`
    pub fn multiphase_array(&self) -> Result<ArrayD<f64>, SmoothError> {
        match &self.field {
            Field::Labels(labels) => Ok(encode_one_hot(labels, self.n_phases())),
            Field::Multiphase(encoded) => Ok(encoded.clone()),
            Field::Grayscale(_) => Err(SmoothError::PreconditionViolation(
                "microstructure has no phases to encode".to_string(),
            )),
        }
    }

    /// Decode to original label values; ties between phases go to the lower index
    pub fn decode_labels(&self) -> Result<ArrayD<i64>, SmoothError> {
        let indices = match &self.field {
            Field::Labels(labels) => labels.clone(),
            Field::Multiphase(encoded) => decode_one_hot(encoded.view()),
            Field::Grayscale(_) => {
                return Err(SmoothError::PreconditionViolation(
                    "microstructure has no phases to decode".to_string(),
                ))
            }
        };
        Ok(indices.mapv(|p| self.phase_labels[p]))
    }

    /// Mean of each phase indicator over the grid
    pub fn volume_fractions(&self) -> Result<Vec<f64>, SmoothError> {
        let encoded = self.multiphase_array()?;
        Ok(crate::smooth::volume_fractions(encoded.view()))
    }

    /// Borrow the one-hot encoding; assigned values are written back on [`MultiphaseEncoding::commit`]
    pub fn multiphase_encoding(&mut self) -> Result<MultiphaseEncoding<'_>, SmoothError> {
        let encoded = self.multiphase_array()?;
        debug!("multiphase encoding acquired, shape {:?}", encoded.shape());
        Ok(MultiphaseEncoding {
            owner: self,
            encoded,
            assigned: false,
        })
    }

    /// Run `f` on the one-hot encoding and commit when it returns `Ok`
    pub fn with_multiphase_encoding<R, F>(&mut self, f: F) -> Result<R, SmoothError>
    where
        F: FnOnce(&mut MultiphaseEncoding<'_>) -> Result<R, SmoothError>,
    {
        let mut encoding = self.multiphase_encoding()?;
        let result = f(&mut encoding)?;
        encoding.commit();
        Ok(result)
    }
}

/// Scoped read/write handle over a microstructure's one-hot encoding
///
/// Dropping the handle without calling [`commit`](Self::commit) leaves the
/// microstructure untouched.
pub struct MultiphaseEncoding<'a> {
    owner: &'a mut Microstructure,
    encoded: ArrayD<f64>,
    assigned: bool,
}

impl<'a> MultiphaseEncoding<'a> {
    pub fn view(&self) -> ArrayViewD<'_, f64> {
        self.encoded.view()
    }

    /// Replace the whole encoding; the shape must match
    pub fn assign(&mut self, values: ArrayD<f64>) -> Result<(), SmoothError> {
        if values.shape() != self.encoded.shape() {
            return Err(SmoothError::ShapeMismatch {
                expected: self.encoded.shape().to_vec(),
                actual: values.shape().to_vec(),
            });
        }
        self.encoded = values;
        self.assigned = true;
        Ok(())
    }

    /// Write an assigned encoding back into the microstructure
    pub fn commit(self) {
        if !self.assigned {
            return;
        }
        let owner = self.owner;
        owner.field = if owner.use_multiphase {
            Field::Multiphase(self.encoded)
        } else {
            Field::Labels(decode_one_hot(self.encoded.view()))
        };
        debug!("multiphase encoding committed");
    }
}
