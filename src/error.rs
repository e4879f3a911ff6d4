//! Error type shared by the smoother, the microstructure and the `.npy` codec.

use thiserror::Error;

/// Errors raised while loading, smoothing or saving a microstructure.
#[derive(Error, Debug)]
pub enum SmoothError {
    /// The microstructure carries no discrete phase information
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// The requested smoothing method is not implemented
    #[error("Smoothing method {0} was chosen, but is not implemented")]
    UnsupportedMethod(String),

    /// A numeric parameter or constructor input is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Input file is missing or has the wrong extension
    #[error("Invalid input file '{path}': {reason}")]
    InvalidInputFile { path: String, reason: String },

    /// Spatial dimensionality or extent is not supported
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// An array was assigned with a shape different from the target
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// Malformed `.npy` content
    #[error("Malformed npy data: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmoothError {
    pub fn invalid_input_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SmoothError::InvalidInputFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        SmoothError::Format(message.into())
    }
}
