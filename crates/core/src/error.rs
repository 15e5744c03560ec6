//! Error types for colordist

use thiserror::Error;

/// Main error type for colordist operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Expected a black and white (1 band) or RGB/RGBA (3 or 4 bands) mask image, got {0} bands")]
    InvalidMaskBands(usize),

    #[error("Band index {index} out of range for image with {n_bands} bands")]
    BandOutOfRange { index: usize, n_bands: usize },

    #[error("Invalid number of mixture components: {components} (sample has {observations} observations)")]
    InvalidComponentCount { components: usize, observations: usize },

    #[error("Not enough annotated pixels. Need more than {min}, but got {got}")]
    InsufficientSample { min: usize, got: usize },

    #[error("Covariance matrix is singular or ill-conditioned: {0}")]
    SingularCovariance(String),

    #[error("EM did not converge within {iterations} iterations (last lower bound change {change:e})")]
    NonConvergence { iterations: usize, change: f64 },

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Model has already been fitted")]
    AlreadyFitted,

    #[error("{0}")]
    Other(String),
}

/// Coarse grouping of [`Error`] variants, for callers that present errors
/// to users (e.g. "collect more annotated pixels").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input shape, band selection or parameter value
    Configuration,
    /// The annotated sample is too small to fit reliably
    InsufficientSample,
    /// Singular covariance or EM non-convergence
    Numerical,
    /// Score before fit, or fit twice
    Lifecycle,
    /// Reading or writing rasters
    Io,
    Other,
}

impl Error {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) | Error::UnsupportedDataType(_) => ErrorCategory::Io,
            Error::InvalidDimensions { .. }
            | Error::IndexOutOfBounds { .. }
            | Error::SizeMismatch { .. }
            | Error::InvalidParameter { .. }
            | Error::InvalidMaskBands(_)
            | Error::BandOutOfRange { .. }
            | Error::InvalidComponentCount { .. } => ErrorCategory::Configuration,
            Error::InsufficientSample { .. } => ErrorCategory::InsufficientSample,
            Error::SingularCovariance(_) | Error::NonConvergence { .. } => ErrorCategory::Numerical,
            Error::NotFitted | Error::AlreadyFitted => ErrorCategory::Lifecycle,
            Error::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias for colordist operations
pub type Result<T> = std::result::Result<T, Error>;
