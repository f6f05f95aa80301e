//! Telemetry collaborator contract and a CSV-export implementation

use crate::data::{format_timestamp, DataLoader, HourlyObservation, Resolution};
use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDateTime};
use polars::prelude::*;
use std::fmt::Debug;
use std::path::PathBuf;

/// Source of raw hourly true values
pub trait TelemetrySource: Debug {
    /// `{datetime, power_true, temperature}` for `[begin, end]`
    ///
    /// Any failure to reach the source is `CollaboratorUnavailable`.
    fn fetch(&self, begin: NaiveDateTime, end: NaiveDateTime, resolution: Resolution)
        -> Result<DataFrame>;
}

/// Telemetry frame for a slice of observations
pub fn observations_to_dataframe(observations: &[HourlyObservation]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "datetime",
            observations
                .iter()
                .map(|o| format_timestamp(&o.timestamp))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "power_true",
            observations.iter().map(|o| o.true_power).collect::<Vec<_>>(),
        ),
        Series::new(
            "temperature",
            observations.iter().map(|o| o.temperature).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// Reads an exported telemetry CSV on every fetch
#[derive(Debug, Clone)]
pub struct CsvTelemetry {
    path: PathBuf,
    /// The export labels each hour by its end; shift labels back one hour
    hour_ending: bool,
}

impl CsvTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hour_ending: false,
        }
    }

    pub fn with_hour_ending(mut self, hour_ending: bool) -> Self {
        self.hour_ending = hour_ending;
        self
    }
}

impl TelemetrySource for CsvTelemetry {
    fn fetch(
        &self,
        begin: NaiveDateTime,
        end: NaiveDateTime,
        resolution: Resolution,
    ) -> Result<DataFrame> {
        if begin > end {
            return Err(ForecastError::ValidationError(format!(
                "Telemetry range {}..{} is reversed",
                begin, end
            )));
        }
        if resolution != Resolution::Hourly {
            return Err(ForecastError::ValidationError(format!(
                "CSV telemetry only serves hourly data, '{}' requested",
                resolution.code()
            )));
        }

        let raw = DataLoader::observations_from_csv(&self.path).map_err(|e| {
            ForecastError::CollaboratorUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let shift = if self.hour_ending {
            Duration::hours(1)
        } else {
            Duration::zero()
        };
        let observations: Vec<HourlyObservation> = raw
            .into_iter()
            .map(|mut o| {
                o.timestamp -= shift;
                o
            })
            .filter(|o| o.timestamp >= begin && o.timestamp <= end)
            .collect();
        observations_to_dataframe(&observations)
    }
}
