//! Feature construction for next-day hourly forecasts
//!
//! A feature row is anchored at one hour of the frame (the forecast issue
//! time). It carries the trailing history of power and temperature, and for
//! every forecast lag `k` the calendar of the predicted hour `row + k + 1`
//! together with the observation one calendar year before that hour.

use crate::data::HourlyFrame;
use crate::error::{ForecastError, Result};
use chrono::{Duration, Months, NaiveDateTime};
use grid_math::CyclicalComponent;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Named feature column; the lag index is part of the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    PowerLag(usize),
    TemperatureLag(usize),
    CyclicalSin(CyclicalComponent, usize),
    CyclicalCos(CyclicalComponent, usize),
    DayOff(usize),
    PowerPrevYear(usize),
    TemperaturePrevYear(usize),
    DayOffPrevYear(usize),
}

impl FeatureKey {
    /// Forecast lag the feature describes; `None` for history lags
    pub fn horizon(&self) -> Option<usize> {
        match *self {
            FeatureKey::PowerLag(_) | FeatureKey::TemperatureLag(_) => None,
            FeatureKey::CyclicalSin(_, k)
            | FeatureKey::CyclicalCos(_, k)
            | FeatureKey::DayOff(k)
            | FeatureKey::PowerPrevYear(k)
            | FeatureKey::TemperaturePrevYear(k)
            | FeatureKey::DayOffPrevYear(k) => Some(k),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKey::PowerLag(k) => write!(f, "power_lag_{}", k),
            FeatureKey::TemperatureLag(k) => write!(f, "temperature_lag_{}", k),
            FeatureKey::CyclicalSin(c, k) => write!(f, "{}_sin_{}", c, k),
            FeatureKey::CyclicalCos(c, k) => write!(f, "{}_cos_{}", c, k),
            FeatureKey::DayOff(k) => write!(f, "day_off_{}", k),
            FeatureKey::PowerPrevYear(k) => write!(f, "power_prev_year_{}", k),
            FeatureKey::TemperaturePrevYear(k) => write!(f, "temperature_prev_year_{}", k),
            FeatureKey::DayOffPrevYear(k) => write!(f, "day_off_prev_year_{}", k),
        }
    }
}

impl FromStr for FeatureKey {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || ForecastError::ValidationError(format!("Unknown feature '{}'", s));
        let (stem, lag) = s.rsplit_once('_').ok_or_else(unknown)?;
        let k: usize = lag.parse().map_err(|_| unknown())?;

        let key = match stem {
            "power_lag" => FeatureKey::PowerLag(k),
            "temperature_lag" => FeatureKey::TemperatureLag(k),
            "day_off" => FeatureKey::DayOff(k),
            "power_prev_year" => FeatureKey::PowerPrevYear(k),
            "temperature_prev_year" => FeatureKey::TemperaturePrevYear(k),
            "day_off_prev_year" => FeatureKey::DayOffPrevYear(k),
            other => {
                let (component, trig) = other.rsplit_once('_').ok_or_else(unknown)?;
                let component = CyclicalComponent::ALL
                    .into_iter()
                    .find(|c| c.name() == component)
                    .ok_or_else(unknown)?;
                match trig {
                    "sin" => FeatureKey::CyclicalSin(component, k),
                    "cos" => FeatureKey::CyclicalCos(component, k),
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(key)
    }
}

/// Which lags and encodings a feature row carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSpec {
    /// Hours back from the row for power and temperature history
    pub lookback_lags: Vec<usize>,
    /// Forecast lags; lag `k` describes the hour `row + k + 1`
    pub forecast_lags: Vec<usize>,
    /// Calendar components encoded at every forecast lag
    pub cyclical: Vec<CyclicalComponent>,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            lookback_lags: (0..180).collect(),
            forecast_lags: (12..36).collect(),
            cyclical: CyclicalComponent::ALL.to_vec(),
        }
    }
}

impl FeatureSpec {
    /// Every feature key in canonical column order
    pub fn keys(&self) -> Vec<FeatureKey> {
        let mut keys = Vec::new();
        for &k in &self.lookback_lags {
            keys.push(FeatureKey::PowerLag(k));
            keys.push(FeatureKey::TemperatureLag(k));
        }
        for &k in &self.forecast_lags {
            keys.extend(self.horizon_keys(k));
        }
        keys
    }

    /// Calendar and prior-year keys of one forecast lag
    pub fn horizon_keys(&self, k: usize) -> Vec<FeatureKey> {
        let mut keys = Vec::with_capacity(self.cyclical.len() * 2 + 4);
        for &component in &self.cyclical {
            keys.push(FeatureKey::CyclicalSin(component, k));
            keys.push(FeatureKey::CyclicalCos(component, k));
        }
        keys.push(FeatureKey::DayOff(k));
        keys.push(FeatureKey::PowerPrevYear(k));
        keys.push(FeatureKey::TemperaturePrevYear(k));
        keys.push(FeatureKey::DayOffPrevYear(k));
        keys
    }

    /// Width of one step of the recurrent sequence input
    pub fn sequence_width(&self) -> usize {
        2 + self.cyclical.len() * 2 + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast_lags.is_empty() {
            return Err(ForecastError::ValidationError(
                "At least one forecast lag is required".to_string(),
            ));
        }
        if self.cyclical.is_empty() {
            return Err(ForecastError::ValidationError(
                "At least one cyclical component is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Features of a single row
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    values: HashMap<FeatureKey, f64>,
}

impl FeatureRow {
    pub fn get(&self, key: &FeatureKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values for `keys` in order; unknown keys are NaN
    pub fn select(&self, keys: &[FeatureKey]) -> Vec<f64> {
        keys.iter()
            .map(|key| self.get(key).unwrap_or(f64::NAN))
            .collect()
    }
}

/// Rows sharing one column layout
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub columns: Vec<FeatureKey>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Export as a polars DataFrame, one column per key plus `datetime`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(self.columns.len() + 1);
        series.push(Series::new(
            "datetime",
            self.rows
                .iter()
                .map(|r| crate::data::format_timestamp(&r.timestamp))
                .collect::<Vec<_>>(),
        ));
        for key in &self.columns {
            let values: Vec<f64> = self
                .rows
                .iter()
                .map(|r| r.get(key).unwrap_or(f64::NAN))
                .collect();
            series.push(Series::new(&key.to_string(), values));
        }
        Ok(DataFrame::new(series)?)
    }
}

/// Builds feature rows from an assembled hourly frame
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    spec: FeatureSpec,
}

impl FeatureBuilder {
    pub fn new(spec: FeatureSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Feature row anchored at `target`
    ///
    /// Fails with `PreconditionUnmet` when a predicted hour has no day-off
    /// flag and with `InsufficientHistory` when the prior-year observation
    /// of a predicted hour is missing.
    pub fn build_row(&self, frame: &HourlyFrame, target: NaiveDateTime) -> Result<FeatureRow> {
        let mut values = HashMap::with_capacity(self.spec.keys().len());

        for &k in &self.spec.lookback_lags {
            let record = frame.get(&(target - Duration::hours(k as i64)));
            let power = record.and_then(|r| r.true_power).unwrap_or(f64::NAN);
            let temperature = record.and_then(|r| r.temperature).unwrap_or(f64::NAN);
            values.insert(FeatureKey::PowerLag(k), power);
            values.insert(FeatureKey::TemperatureLag(k), temperature);
        }

        for &k in &self.spec.forecast_lags {
            let predicted = target + Duration::hours(k as i64 + 1);
            for &component in &self.spec.cyclical {
                let (sin, cos) = component.encode(&predicted);
                values.insert(FeatureKey::CyclicalSin(component, k), sin);
                values.insert(FeatureKey::CyclicalCos(component, k), cos);
            }

            let day_off = frame
                .get(&predicted)
                .and_then(|r| r.day_off)
                .ok_or_else(|| {
                    ForecastError::PreconditionUnmet(format!(
                        "No day-off flag for predicted hour {}",
                        predicted
                    ))
                })?;
            values.insert(FeatureKey::DayOff(k), flag(day_off));

            let prior = prior_year(predicted)?;
            let record = frame.get(&prior);
            let (power, temperature) = match record.map(|r| (r.true_power, r.temperature)) {
                Some((Some(power), Some(temperature))) => (power, temperature),
                _ => {
                    return Err(ForecastError::InsufficientHistory(format!(
                        "No prior-year observation at {} for predicted hour {}",
                        prior, predicted
                    )))
                }
            };
            // a day without a calendar entry counts as a working day
            let prior_day_off = record.and_then(|r| r.day_off).unwrap_or(false);
            values.insert(FeatureKey::PowerPrevYear(k), power);
            values.insert(FeatureKey::TemperaturePrevYear(k), temperature);
            values.insert(FeatureKey::DayOffPrevYear(k), flag(prior_day_off));
        }

        Ok(FeatureRow {
            timestamp: target,
            values,
        })
    }

    /// Feature rows for several targets, in the given order
    pub fn build_table(&self, frame: &HourlyFrame, targets: &[NaiveDateTime]) -> Result<FeatureTable> {
        let rows = targets
            .iter()
            .map(|&target| self.build_row(frame, target))
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureTable {
            columns: self.spec.keys(),
            rows,
        })
    }

    /// Recurrent input: `window + 1` hourly steps ending at `anchor`
    ///
    /// Each step is `[power, temperature, sin/cos per cyclical component,
    /// day_off]` at raw scale. Missing power or temperature is NaN.
    pub fn sequence(
        &self,
        frame: &HourlyFrame,
        anchor: NaiveDateTime,
        window: usize,
    ) -> Result<Array2<f64>> {
        let width = self.spec.sequence_width();
        let first = anchor - Duration::hours(window as i64);
        if frame.get(&first).is_none() || frame.get(&anchor).is_none() {
            return Err(ForecastError::InsufficientHistory(format!(
                "Frame {}..{} does not cover sequence {}..{}",
                frame.start(),
                frame.end(),
                first,
                anchor
            )));
        }

        let mut data = Vec::with_capacity((window + 1) * width);
        for step in 0..=window {
            let ts = first + Duration::hours(step as i64);
            let record = frame.get(&ts);
            data.push(record.and_then(|r| r.true_power).unwrap_or(f64::NAN));
            data.push(record.and_then(|r| r.temperature).unwrap_or(f64::NAN));
            for &component in &self.spec.cyclical {
                let (sin, cos) = component.encode(&ts);
                data.push(sin);
                data.push(cos);
            }
            data.push(flag(record.and_then(|r| r.day_off).unwrap_or(false)));
        }

        Array2::from_shape_vec((window + 1, width), data)
            .map_err(|e| ForecastError::DataError(format!("Sequence shape: {}", e)))
    }
}

/// Same wall-clock hour one calendar year earlier; Feb 29 maps to Feb 28
pub fn prior_year(ts: NaiveDateTime) -> Result<NaiveDateTime> {
    ts.checked_sub_months(Months::new(12)).ok_or_else(|| {
        ForecastError::DataError(format!("Cannot shift {} one year back", ts))
    })
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_key_names_round_trip() {
        let spec = FeatureSpec::default();
        for key in spec.keys() {
            assert_eq!(key.to_string().parse::<FeatureKey>().unwrap(), key);
        }
        assert_eq!(
            FeatureKey::CyclicalSin(CyclicalComponent::DayOfYear, 12).to_string(),
            "day_of_year_sin_12"
        );
        assert!("power_lag_x".parse::<FeatureKey>().is_err());
        assert!("minute_sin_3".parse::<FeatureKey>().is_err());
    }

    #[test]
    fn test_default_spec_width() {
        let spec = FeatureSpec::default();
        // 180 history lags of two columns, 24 horizons of 12 features
        assert_eq!(spec.keys().len(), 360 + 24 * 12);
        assert_eq!(spec.sequence_width(), 11);
    }

    #[test]
    fn test_prior_year_clamps_leap_day() {
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap();
        assert_eq!(
            prior_year(leap).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28)
                .unwrap()
                .and_hms_opt(5, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_horizon() {
        assert_eq!(FeatureKey::PowerLag(3).horizon(), None);
        assert_eq!(FeatureKey::DayOffPrevYear(20).horizon(), Some(20));
    }
}
