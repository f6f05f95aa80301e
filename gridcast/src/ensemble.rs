//! Running several models over the same history window

use crate::data::{midnight, HourlyFrame};
use crate::error::{ForecastError, Result};
use crate::features::prior_year;
use crate::models::{DayForecast, ModelSpec, HOURS_PER_DAY};
use crate::store::SqliteStore;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use statrs::statistics::Statistics;
use std::collections::HashSet;
use tracing::{info, warn};

/// Column name reserved for the cross-model mean
pub const ENSEMBLE_COLUMN: &str = "ensemble";

/// Named 24-hour forecasts of one date
#[derive(Debug, Clone)]
pub struct PredictionTable {
    date: NaiveDate,
    columns: Vec<(String, DayForecast)>,
}

impl PredictionTable {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            columns: Vec::new(),
        }
    }

    /// Add a member column; names must be unique and not the reserved ensemble name
    pub fn push(&mut self, name: impl Into<String>, forecast: DayForecast) -> Result<()> {
        let name = name.into();
        if name.is_empty() || name == ENSEMBLE_COLUMN {
            return Err(ForecastError::ValidationError(format!(
                "Invalid forecast column name '{}'",
                name
            )));
        }
        if self.get(&name).is_some() {
            return Err(ForecastError::ValidationError(format!(
                "Duplicate forecast column '{}'",
                name
            )));
        }
        self.columns.push((name, forecast));
        Ok(())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn columns(&self) -> &[(String, DayForecast)] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DayForecast> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, forecast)| forecast)
    }

    /// Hourly mean across all member columns
    pub fn ensemble(&self) -> Result<DayForecast> {
        if self.columns.is_empty() {
            return Err(ForecastError::ValidationError(
                "Cannot average an empty prediction table".to_string(),
            ));
        }
        let values = (0..HOURS_PER_DAY)
            .map(|h| self.columns.iter().map(|(_, f)| f.values()[h]).mean())
            .collect();
        DayForecast::new(values)
    }

    /// `datetime` column plus one column per member and the ensemble
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = vec![Series::new(
            "datetime",
            DayForecast::timestamps(self.date)
                .iter()
                .map(crate::data::format_timestamp)
                .collect::<Vec<_>>(),
        )];
        for (name, forecast) in &self.columns {
            series.push(Series::new(name, forecast.values()));
        }
        series.push(Series::new(ENSEMBLE_COLUMN, self.ensemble()?.values()));
        Ok(DataFrame::new(series)?)
    }
}

/// Runs every configured model for one forecast date
#[derive(Debug, Clone)]
pub struct EnsembleCaller {
    anchor_hour: u32,
}

impl Default for EnsembleCaller {
    fn default() -> Self {
        Self { anchor_hour: 11 }
    }
}

impl EnsembleCaller {
    pub fn new(anchor_hour: u32) -> Self {
        Self { anchor_hour }
    }

    /// Issue time of a forecast for `date`: the day before at the anchor hour
    pub fn anchor_time(&self, date: NaiveDate) -> Result<NaiveDateTime> {
        let time = NaiveTime::from_hms_opt(self.anchor_hour, 0, 0).ok_or_else(|| {
            ForecastError::ValidationError(format!("Invalid anchor hour {}", self.anchor_hour))
        })?;
        Ok((date - Duration::days(1)).and_time(time))
    }

    /// Check that the store can support a forecast for `date`
    pub fn check_preconditions(&self, store: &SqliteStore, date: NaiveDate) -> Result<()> {
        let required = date - Duration::days(1);
        match store.latest_observed_power()? {
            Some(last) if last.date() >= required => {}
            last => {
                return Err(ForecastError::PreconditionUnmet(format!(
                    "True power ends at {}, forecast for {} needs data through {}",
                    last.map_or_else(|| "nothing".to_string(), |ts| ts.to_string()),
                    date,
                    required
                )))
            }
        }
        match store.latest_calendar_date()? {
            Some(last) if last >= date => Ok(()),
            last => Err(ForecastError::PreconditionUnmet(format!(
                "Day-off calendar ends at {}, forecast for {} needs it through {}",
                last.map_or_else(|| "nothing".to_string(), |d| d.to_string()),
                date,
                date
            ))),
        }
    }

    /// History frame `[date - 1 year 00:00, date 23:00]`
    pub fn load_frame(&self, store: &SqliteStore, date: NaiveDate) -> Result<HourlyFrame> {
        let end = midnight(date) + Duration::hours(HOURS_PER_DAY as i64 - 1);
        let start = prior_year(midnight(date))?;
        let observations = store.load_observations(start, end)?;
        let calendar = store.load_calendar(start.date(), date)?;
        HourlyFrame::assemble(start, end, &observations, &calendar)
    }

    /// Forecast `date` with every model in `specs`
    ///
    /// Preconditions are checked before any model runs; any model failure
    /// aborts the whole call.
    pub fn forecast(
        &self,
        store: &SqliteStore,
        date: NaiveDate,
        specs: &[ModelSpec],
    ) -> Result<PredictionTable> {
        validate_specs(specs)?;
        if let Err(err) = self.check_preconditions(store, date) {
            warn!(component = "ensemble", event = "ensemble.precondition", %date, error = %err);
            return Err(err);
        }

        let anchor = self.anchor_time(date)?;
        let frame = self.load_frame(store, date)?;
        info!(
            component = "ensemble",
            event = "ensemble.start",
            %date,
            %anchor,
            models = specs.len(),
            frame_rows = frame.len()
        );

        let mut table = PredictionTable::new(date);
        for spec in specs {
            let forecast = spec.adapter.predict(&frame, anchor, &spec.location)?;
            info!(
                component = "ensemble",
                event = "ensemble.model.done",
                model = %spec.name,
                kind = %spec.adapter.kind()
            );
            table.push(spec.name.clone(), forecast)?;
        }
        Ok(table)
    }
}

fn validate_specs(specs: &[ModelSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(ForecastError::ValidationError(
            "At least one model is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for spec in specs {
        if spec.name.is_empty() || spec.name == ENSEMBLE_COLUMN {
            return Err(ForecastError::ValidationError(format!(
                "Invalid model name '{}'",
                spec.name
            )));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ForecastError::ValidationError(format!(
                "Model name '{}' used twice",
                spec.name
            )));
        }
    }
    Ok(())
}
