//! Persistence baseline: tomorrow looks like the last day

use super::{DayForecast, ModelAdapter, ModelKind};
use crate::data::HourlyFrame;
use crate::error::{ForecastError, Result};
use chrono::NaiveDateTime;
use grid_math::SimpleMovingAverage;
use std::path::Path;

/// Mean of the last `window` observed powers, repeated for every hour
#[derive(Debug, Clone)]
pub struct MovingAverageAdapter {
    window: usize,
}

impl MovingAverageAdapter {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl ModelAdapter for MovingAverageAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::MovingAverage
    }

    fn predict(
        &self,
        history: &HourlyFrame,
        anchor: NaiveDateTime,
        _location: &Path,
    ) -> Result<DayForecast> {
        let observed = history.observed_power_until(&anchor);
        if observed.len() < self.window {
            return Err(ForecastError::InsufficientHistory(format!(
                "Moving average needs {} observed hours up to {}, found {}",
                self.window,
                anchor,
                observed.len()
            )));
        }
        let tail = &observed[observed.len() - self.window..];
        let sma = SimpleMovingAverage::from_values(self.window, tail)?;
        DayForecast::constant(sma.value()?)
    }
}
