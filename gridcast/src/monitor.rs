//! Monthly forecast quality against observed consumption

use crate::data::month_hours;
use crate::ensemble::ENSEMBLE_COLUMN;
use crate::error::{ForecastError, Result};
use crate::store::SqliteStore;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use grid_math::Accuracy;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Error of one model over the month
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAccuracy {
    pub model: String,
    pub hours: usize,
    pub accuracy: Accuracy,
}

/// Ensemble error of one day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAccuracy {
    pub date: NaiveDate,
    pub accuracy: Accuracy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// First day of the evaluated month
    pub month: NaiveDate,
    /// Hours with both a forecast and a true value
    pub records: usize,
    pub models: Vec<ModelAccuracy>,
    pub daily: Vec<DailyAccuracy>,
}

impl QualityReport {
    fn empty(month: NaiveDate) -> Self {
        Self {
            month,
            records: 0,
            models: Vec::new(),
            daily: Vec::new(),
        }
    }

    pub fn days(&self) -> usize {
        self.records / 24
    }

    pub fn period(&self) -> String {
        self.month.format("%Y-%m").to_string()
    }

    /// Path of the rendered report for `month` inside `dir`
    pub fn file_path(dir: &Path, month: NaiveDate) -> PathBuf {
        dir.join(format!("report_{}.txt", month.format("%Y-%m")))
    }

    /// Render the report into `dir`, replacing an older one
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = Self::file_path(dir, self.month);
        fs::write(&path, self.to_string())?;
        Ok(path)
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records == 0 {
            return writeln!(f, "Period {}: 0 records in the store", self.period());
        }
        writeln!(
            f,
            "Period {}: {} records over {} days",
            self.period(),
            self.records,
            self.days()
        )?;
        for model in &self.models {
            writeln!(
                f,
                "Model {} mean error {} MW (%) over {} hours",
                model.model, model.accuracy, model.hours
            )?;
        }
        if !self.daily.is_empty() {
            writeln!(f)?;
            writeln!(f, "Daily ensemble error, MAE (MAPE):")?;
            for day in &self.daily {
                writeln!(f, "{} {}", day.date, day.accuracy)?;
            }
        }
        Ok(())
    }
}

/// Hourly pivot: one row per timestamp, one cell per model
type Pivot = BTreeMap<NaiveDateTime, HashMap<String, f64>>;

#[derive(Debug, Clone, Default)]
pub struct QualityMonitor;

impl QualityMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every model with forecasts in the month of `month`
    pub fn evaluate(&self, store: &SqliteStore, month: NaiveDate) -> Result<QualityReport> {
        let (start, end) = month_hours(month)?;
        let first_day = start.date();

        let models = store.distinct_models(start, end)?;
        let truth: BTreeMap<NaiveDateTime, f64> =
            store.observed_power(start, end)?.into_iter().collect();
        if models.is_empty() || truth.is_empty() {
            info!(
                component = "monitor",
                event = "monitor.empty",
                month = %first_day.format("%Y-%m"),
                models = models.len(),
                observed = truth.len()
            );
            return Ok(QualityReport::empty(first_day));
        }

        // group by timestamp, keeping the largest value per model
        let mut pivot: Pivot = BTreeMap::new();
        for record in store.predictions_between(start, end)? {
            let cell = pivot
                .entry(record.timestamp)
                .or_default()
                .entry(record.model)
                .or_insert(f64::MIN);
            *cell = cell.max(record.predicted_power);
        }
        pivot.retain(|ts, _| truth.contains_key(ts));

        let mut report = QualityReport::empty(first_day);
        report.records = pivot.len();
        if pivot.is_empty() {
            return Ok(report);
        }

        for model in &models {
            let (actual, predicted): (Vec<f64>, Vec<f64>) = pivot
                .iter()
                .filter_map(|(ts, row)| Some((truth[ts], *row.get(model)?)))
                .unzip();
            if actual.is_empty() {
                continue;
            }
            report.models.push(ModelAccuracy {
                model: model.clone(),
                hours: actual.len(),
                accuracy: Accuracy::between(&actual, &predicted)?,
            });
        }

        let mut by_day: BTreeMap<NaiveDate, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for (ts, row) in &pivot {
            let Some(ensemble) = ensemble_value(row) else {
                continue;
            };
            let day = by_day.entry(ts.date()).or_default();
            day.0.push(truth[ts]);
            day.1.push(ensemble);
        }
        for (date, (actual, predicted)) in by_day {
            report.daily.push(DailyAccuracy {
                date,
                accuracy: Accuracy::between(&actual, &predicted)?,
            });
        }

        info!(
            component = "monitor",
            event = "monitor.done",
            month = %report.period(),
            records = report.records,
            models = report.models.len()
        );
        Ok(report)
    }
}

/// Stored ensemble value, or the member mean when none was stored
fn ensemble_value(row: &HashMap<String, f64>) -> Option<f64> {
    if let Some(value) = row.get(ENSEMBLE_COLUMN) {
        return Some(*value);
    }
    if row.is_empty() {
        return None;
    }
    Some(row.values().mean())
}

/// First day of the month before the one containing `today`
pub fn previous_month(today: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ForecastError::ValidationError(format!("No month before {}", today)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_month_wraps_year() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            previous_month(jan).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()
        );
    }

    #[test]
    fn test_render() {
        let month = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(
            QualityReport::empty(month).to_string(),
            "Period 2024-04: 0 records in the store\n"
        );

        let report = QualityReport {
            month,
            records: 48,
            models: vec![ModelAccuracy {
                model: "lgbm".to_string(),
                hours: 48,
                accuracy: Accuracy { mae: 12.34, mape: 1.26 },
            }],
            daily: vec![],
        };
        let text = report.to_string();
        assert!(text.starts_with("Period 2024-04: 48 records over 2 days\n"));
        assert!(text.contains("Model lgbm mean error 12.3 (1.3) MW (%) over 48 hours"));
    }

    #[test]
    fn test_ensemble_value_falls_back_to_mean() {
        let mut row = HashMap::new();
        row.insert("a".to_string(), 10.0);
        row.insert("b".to_string(), 20.0);
        assert_eq!(ensemble_value(&row), Some(15.0));
        row.insert(ENSEMBLE_COLUMN.to_string(), 7.0);
        assert_eq!(ensemble_value(&row), Some(7.0));
    }
}
