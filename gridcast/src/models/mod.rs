//! Model adapters turning an hourly frame into a 24-hour forecast

use crate::config::PipelineConfig;
use crate::data::HourlyFrame;
use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod baseline;
pub mod recurrent;
pub mod tree;

pub use baseline::MovingAverageAdapter;
pub use recurrent::RecurrentAdapter;
pub use tree::TreeEnsembleAdapter;

/// Hours in one forecast day
pub const HOURS_PER_DAY: usize = 24;

/// Predicted power for hours 00:00..23:00 of one day
#[derive(Debug, Clone, PartialEq)]
pub struct DayForecast {
    values: Vec<f64>,
}

impl DayForecast {
    /// Create a forecast; exactly 24 finite values are required
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != HOURS_PER_DAY {
            return Err(ForecastError::ValidationError(format!(
                "Values length ({}) doesn't match horizons ({})",
                values.len(),
                HOURS_PER_DAY
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::ValidationError(format!(
                "Forecast value for hour {} is not finite",
                pos
            )));
        }
        Ok(Self { values })
    }

    /// The same value for every hour
    pub fn constant(value: f64) -> Result<Self> {
        Self::new(vec![value; HOURS_PER_DAY])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Hourly timestamps of `date` the values belong to
    pub fn timestamps(date: NaiveDate) -> Vec<NaiveDateTime> {
        let midnight = crate::data::midnight(date);
        (0..HOURS_PER_DAY)
            .map(|h| midnight + Duration::hours(h as i64))
            .collect()
    }
}

/// Date forecast from an issue time: the day after the anchor
pub fn forecast_date(anchor: NaiveDateTime) -> NaiveDate {
    anchor.date() + Duration::days(1)
}

/// Forecast lag `k` of every hour of the forecast date, so that
/// `anchor + k + 1` hours lands on that hour
pub fn horizon_lags(anchor: NaiveDateTime) -> Vec<usize> {
    DayForecast::timestamps(forecast_date(anchor))
        .into_iter()
        .map(|ts| ((ts - anchor).num_hours() - 1) as usize)
        .collect()
}

/// The model families an ensemble can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Gradient-boosted regression trees, one ensemble per forecast lag
    TreeEnsemble,
    /// GRU encoder over the trailing week with a dense head
    Recurrent,
    /// Mean of the most recent observed hours
    MovingAverage,
}

impl ModelKind {
    /// Build the adapter for this kind with the pipeline's feature settings
    pub fn adapter(self, config: &PipelineConfig) -> Box<dyn ModelAdapter> {
        match self {
            ModelKind::TreeEnsemble => Box::new(TreeEnsembleAdapter::new(config.features.clone())),
            ModelKind::Recurrent => Box::new(RecurrentAdapter::new(
                config.features.clone(),
                config.sequence_window,
            )),
            ModelKind::MovingAverage => {
                Box::new(MovingAverageAdapter::new(config.moving_average_window))
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::TreeEnsemble => "tree_ensemble",
            ModelKind::Recurrent => "recurrent",
            ModelKind::MovingAverage => "moving_average",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tree_ensemble" | "lgbm" => Ok(ModelKind::TreeEnsemble),
            "recurrent" | "rnn" => Ok(ModelKind::Recurrent),
            "moving_average" => Ok(ModelKind::MovingAverage),
            other => Err(ForecastError::ValidationError(format!(
                "Unknown model kind '{}'",
                other
            ))),
        }
    }
}

/// Capability shared by every forecasting model
pub trait ModelAdapter: Debug {
    /// Family of the model
    fn kind(&self) -> ModelKind;

    /// Predict the 24 hours of the day after `anchor`.
    ///
    /// `history` covers at least one year before the forecast date and the
    /// calendar of the forecast date itself. Artifacts are read from
    /// `location`; a missing or incompatible artifact is an `ArtifactLoad`
    /// error.
    fn predict(
        &self,
        history: &HourlyFrame,
        anchor: NaiveDateTime,
        location: &Path,
    ) -> Result<DayForecast>;
}

/// One ensemble member
#[derive(Debug)]
pub struct ModelSpec {
    pub adapter: Box<dyn ModelAdapter>,
    /// Column name of the member's forecast
    pub name: String,
    pub location: PathBuf,
}

impl ModelSpec {
    pub fn new(
        adapter: Box<dyn ModelAdapter>,
        name: impl Into<String>,
        location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            adapter,
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Deserialize a JSON artifact, reporting any failure as `ArtifactLoad`
pub(crate) fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ForecastError::artifact(path, e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| ForecastError::artifact(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_forecast_length() {
        assert!(DayForecast::new(vec![1.0; 23]).is_err());
        assert!(DayForecast::new(vec![1.0; 25]).is_err());
        let mut values = vec![1.0; 24];
        values[5] = f64::NAN;
        assert!(DayForecast::new(values).is_err());
        assert_eq!(DayForecast::constant(3.0).unwrap().values().len(), 24);
    }

    #[test]
    fn test_horizon_lags_from_late_morning_anchor() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let lags = horizon_lags(anchor);
        assert_eq!(lags, (12..36).collect::<Vec<_>>());
        assert_eq!(
            forecast_date(anchor),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("rnn".parse::<ModelKind>().unwrap(), ModelKind::Recurrent);
        assert_eq!(
            "tree_ensemble".parse::<ModelKind>().unwrap(),
            ModelKind::TreeEnsemble
        );
        assert!("arima".parse::<ModelKind>().is_err());
    }
}
