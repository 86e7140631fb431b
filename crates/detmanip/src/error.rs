//! Error types for detmanip

use thiserror::Error;

/// Errors that can occur while building or maintaining a determinant
#[derive(Debug, Error)]
pub enum DetManipError {
    /// Row and column argument lists have different lengths
    #[error("Dimension mismatch: {nx} row arguments but {ny} column arguments")]
    DimensionMismatch { nx: usize, ny: usize },

    /// Singular matrix encountered while inverting
    #[error("Singular matrix encountered during inversion")]
    SingularMatrix,

    /// The incrementally updated inverse drifted away from a fresh inversion
    #[error("Inverse deviation {deviation:e} exceeds the critical bound {bound:e}")]
    DeviationAboveThreshold { deviation: f64, bound: f64 },

    /// A checkpoint or other external input is inconsistent
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

/// Result type for determinant manipulations
pub type Result<T> = std::result::Result<T, DetManipError>;
