//! Fitted feature scalers
//!
//! Scalers are fitted offline together with the models they feed; here they
//! are only applied. Parameters are stored per column, so a scaler fitted on
//! `n` columns transforms rows of exactly `n` values.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// A column-wise affine scaler with fitted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    /// z-score scaling: `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// range scaling: `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl FittedScaler {
    const EPSILON: f64 = 1e-12;

    /// Number of columns the scaler was fitted on
    pub fn width(&self) -> usize {
        match self {
            FittedScaler::Standard { mean, .. } => mean.len(),
            FittedScaler::MinMax { min, .. } => min.len(),
        }
    }

    /// Check that the parameter vectors agree with each other
    pub fn validate(&self) -> Result<()> {
        let (a, b) = match self {
            FittedScaler::Standard { mean, scale } => (mean.len(), scale.len()),
            FittedScaler::MinMax { min, scale } => (min.len(), scale.len()),
        };
        if a != b {
            return Err(MathError::DimensionMismatch {
                expected: a,
                actual: b,
            });
        }
        if a == 0 {
            return Err(MathError::InvalidInput(
                "Scaler has no fitted columns".to_string(),
            ));
        }
        Ok(())
    }

    /// Scale one row in place
    pub fn transform_row(&self, row: &mut [f64]) -> Result<()> {
        self.check_width(row.len())?;
        match self {
            FittedScaler::Standard { mean, scale } => {
                for ((x, m), s) in row.iter_mut().zip(mean).zip(scale) {
                    *x = (*x - m) / Self::guard(*s);
                }
            }
            FittedScaler::MinMax { min, scale } => {
                for ((x, m), s) in row.iter_mut().zip(min).zip(scale) {
                    *x = *x * s + m;
                }
            }
        }
        Ok(())
    }

    /// Undo the scaling of one row in place
    pub fn inverse_transform_row(&self, row: &mut [f64]) -> Result<()> {
        self.check_width(row.len())?;
        match self {
            FittedScaler::Standard { mean, scale } => {
                for ((x, m), s) in row.iter_mut().zip(mean).zip(scale) {
                    *x = *x * Self::guard(*s) + m;
                }
            }
            FittedScaler::MinMax { min, scale } => {
                for ((x, m), s) in row.iter_mut().zip(min).zip(scale) {
                    *x = (*x - m) / Self::guard(*s);
                }
            }
        }
        Ok(())
    }

    // zero-variance columns are fitted with a unit scale
    fn guard(scale: f64) -> f64 {
        if scale.abs() < Self::EPSILON {
            1.0
        } else {
            scale
        }
    }

    fn check_width(&self, len: usize) -> Result<()> {
        if len != self.width() {
            return Err(MathError::DimensionMismatch {
                expected: self.width(),
                actual: len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_scaler() {
        let scaler = FittedScaler::Standard {
            mean: vec![100.0, 10.0],
            scale: vec![20.0, 0.0],
        };
        let mut row = vec![140.0, 12.0];
        scaler.transform_row(&mut row).unwrap();
        assert_relative_eq!(row[0], 2.0);
        assert_relative_eq!(row[1], 2.0);

        scaler.inverse_transform_row(&mut row).unwrap();
        assert_relative_eq!(row[0], 140.0);
        assert_relative_eq!(row[1], 12.0);
    }

    #[test]
    fn test_min_max_scaler() {
        let scaler = FittedScaler::MinMax {
            min: vec![-1.0],
            scale: vec![0.01],
        };
        let mut row = vec![150.0];
        scaler.transform_row(&mut row).unwrap();
        assert_relative_eq!(row[0], 0.5);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let scaler = FittedScaler::Standard {
            mean: vec![0.0, 0.0],
            scale: vec![1.0, 1.0],
        };
        let mut row = vec![1.0, 2.0, 3.0];
        assert_eq!(
            scaler.transform_row(&mut row),
            Err(MathError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );

        let broken = FittedScaler::MinMax {
            min: vec![0.0],
            scale: vec![],
        };
        assert!(broken.validate().is_err());
    }
}
