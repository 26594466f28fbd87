//! Error types for elevation enrichment.

use thiserror::Error;

/// Errors from fetching and validating elevations.
#[derive(Debug, Error)]
pub enum ElevationError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Elevation service returned status {0}")]
    Status(u16),

    #[error("Malformed elevation response: {0}")]
    Decode(String),

    #[error("Expected {expected} elevations, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Batch of {actual} points exceeds the limit of {max}")]
    TooManyPoints { max: usize, actual: usize },

    #[error("Invalid coordinate at index {index}")]
    InvalidPoint { index: usize },
}

impl ElevationError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            ElevationError::Http(_) => true,
            ElevationError::Status(code) => *code == 429 || *code >= 500,
            ElevationError::Decode(_) | ElevationError::CountMismatch { .. } => true,
            ElevationError::TooManyPoints { .. } | ElevationError::InvalidPoint { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ElevationError>;
