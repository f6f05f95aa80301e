//! Rolling simple moving average
//!
//! Used by the persistence-style baseline forecaster, which predicts the
//! mean of the most recent observed hours.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) over a fixed number of observations
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Feed every value of a slice, oldest first
    pub fn from_values(period: usize, values: &[f64]) -> Result<Self> {
        let mut sma = Self::new(period)?;
        for &value in values {
            sma.update(value)?;
        }
        Ok(sma)
    }

    /// Update the SMA with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Moving average input must be finite, got {}",
                value
            )));
        }

        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }

        Ok(())
    }

    /// Get the current SMA value
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for SMA calculation. Need {} values, have {}.",
                self.period,
                self.values.len()
            )));
        }

        Ok(self.sum / self.period as f64)
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }
}
