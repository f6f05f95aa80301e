//! Error types for the gridcast crate

use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the gridcast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The store does not yet hold the history or calendar a forecast needs
    #[error("Precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// The telemetry collaborator returned nothing or failed
    #[error("Telemetry unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A model artifact is missing, unreadable or does not fit the features
    #[error("Cannot load model artifact {path}: {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },

    /// Year-over-year or lag features cannot be built from the frame
    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from the forecast store
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from JSON (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from CSV output
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error from numeric helpers
    #[error("Math error: {0}")]
    Math(#[from] grid_math::MathError),
}

/// Coarse classification used by the runs to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Forecast abandoned, nothing written
    PreconditionUnmet,
    /// Ingestion skipped, run continues on persisted data
    CollaboratorUnavailable,
    /// Fatal for the run, no reduced ensemble fallback
    ArtifactLoadFailure,
    /// Anything else: data, storage or configuration failures
    Failure,
}

impl ForecastError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::PreconditionUnmet(_) => ErrorKind::PreconditionUnmet,
            ForecastError::CollaboratorUnavailable(_) => ErrorKind::CollaboratorUnavailable,
            ForecastError::ArtifactLoad { .. } => ErrorKind::ArtifactLoadFailure,
            _ => ErrorKind::Failure,
        }
    }

    /// Whether the error should terminate the current run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::PreconditionUnmet | ErrorKind::CollaboratorUnavailable
        )
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ForecastError::ArtifactLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<polars::prelude::PolarsError> for ForecastError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
