//! Publishing the day's ensemble forecast

use crate::data::format_timestamp;
use crate::error::Result;
use crate::models::DayForecast;
use chrono::NaiveDate;
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Receiver of the final hourly forecast of a date
pub trait ReportSink: Debug {
    fn publish(&self, date: NaiveDate, forecast: &DayForecast) -> Result<()>;
}

/// Writes `forecast_<date>.csv` with `datetime,power_pred` rows
#[derive(Debug, Clone)]
pub struct CsvReportWriter {
    dir: PathBuf,
}

impl CsvReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("forecast_{}.csv", date.format("%Y-%m-%d")))
    }
}

impl ReportSink for CsvReportWriter {
    fn publish(&self, date: NaiveDate, forecast: &DayForecast) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(date);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["datetime", "power_pred"])?;
        for (ts, value) in DayForecast::timestamps(date).iter().zip(forecast.values()) {
            writer.write_record([format_timestamp(ts), format!("{:.3}", value)])?;
        }
        writer.flush()?;
        info!(component = "report", event = "report.published", path = %path.display());
        Ok(())
    }
}
