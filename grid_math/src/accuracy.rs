//! Forecast accuracy metrics

use crate::{MathError, Result};
use std::fmt;

/// Mean absolute error between actual and predicted values
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();

    Ok(sum / actual.len() as f64)
}

/// Mean absolute percentage error, in percent
///
/// Actual values of zero are clamped to machine epsilon in the denominator,
/// so a zero reading yields a very large but finite error.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs() / a.abs().max(f64::EPSILON))
        .sum();

    Ok(sum / actual.len() as f64 * 100.0)
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() {
        return Err(MathError::InsufficientData(
            "Accuracy metrics need at least one value".to_string(),
        ));
    }
    if actual.len() != predicted.len() {
        return Err(MathError::DimensionMismatch {
            expected: actual.len(),
            actual: predicted.len(),
        });
    }
    Ok(())
}

/// MAE and MAPE of one forecast series against the truth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accuracy {
    /// Mean Absolute Error, in the unit of the series
    pub mae: f64,
    /// Mean Absolute Percentage Error, in percent
    pub mape: f64,
}

impl Accuracy {
    /// Compute both metrics at once
    pub fn between(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        Ok(Self {
            mae: mean_absolute_error(actual, predicted)?,
            mape: mean_absolute_percentage_error(actual, predicted)?,
        })
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} ({:.1})", self.mae, self.mape)
    }
}
