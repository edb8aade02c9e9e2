//! Error types for the multitone mixer simulator.
//!
//! This module provides a unified error type [`MultitoneError`] that covers
//! contract violations on tones and harmonics, numerical failures in the
//! harmonic-balance solver, and problems loading response-function data.

use thiserror::Error;

/// Result type alias using [`MultitoneError`].
pub type Result<T> = std::result::Result<T, MultitoneError>;

/// Unified error type for all multitone operations.
#[derive(Error, Debug)]
pub enum MultitoneError {
    // ============ Contract Violations ============
    /// Harmonic order outside `1..=count`
    #[error("Requested non-existent harmonic {index} (tone has {count} harmonics)")]
    InvalidHarmonic { index: usize, count: usize },

    /// Tone index outside the balance's tone list
    #[error("Requested non-existent tone {index} (balance has {count} tones)")]
    InvalidTone { index: usize, count: usize },

    /// Attempt to remove the only harmonic of a tone
    #[error("Cannot remove the last remaining harmonic of a tone")]
    LastHarmonic,

    /// Invalid solver or tone parameter
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    // ============ Numerical Errors ============
    /// Jacobian is singular or too ill-conditioned to invert
    #[error("Singular Jacobian at column {column} - harmonic balance cannot take a Newton step")]
    SingularJacobian { column: usize },

    /// Residual evaluation produced NaN or infinity
    #[error("Non-finite residual at component {index}")]
    NonFiniteResidual { index: usize },

    // ============ Response Data Errors ============
    /// Tabulated I-V or KK data is unusable
    #[error("Invalid response data: {message}")]
    InvalidResponseData { message: String },

    // ============ I/O Errors ============
    /// Error reading a data or job file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed job file
    #[cfg(feature = "cli")]
    #[error("Invalid job file '{path}': {message}")]
    ConfigError { path: String, message: String },
}

impl MultitoneError {
    /// Create an invalid harmonic error
    pub fn invalid_harmonic(index: usize, count: usize) -> Self {
        Self::InvalidHarmonic { index, count }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an invalid response data error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponseData {
            message: message.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }
}
