//! # Grid Math
//!
//! Numeric building blocks for hourly load forecasting.
//! This crate provides cyclical calendar encodings, fitted feature scalers,
//! forecast accuracy metrics and a rolling moving average.

use thiserror::Error;

pub mod accuracy;
pub mod cyclical;
pub mod moving_averages;
pub mod scaling;

pub use accuracy::{mean_absolute_error, mean_absolute_percentage_error, Accuracy};
pub use cyclical::CyclicalComponent;
pub use moving_averages::SimpleMovingAverage;
pub use scaling::FittedScaler;

/// Errors that can occur in forecasting-related calculations
#[derive(Error, Debug, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for grid math operations
pub type Result<T> = std::result::Result<T, MathError>;
