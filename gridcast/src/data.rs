//! Hourly consumption series, calendar flags and their tabular loaders

use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Textual timestamp layout used by the store and by exported frames
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: [&str; 4] = [
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Render a timestamp in the store layout
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written in any of the accepted layouts; a bare date
/// is read as midnight
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in ACCEPTED_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::default()));
    }
    Err(ForecastError::DataError(format!(
        "Unrecognised timestamp '{}'",
        raw
    )))
}

/// Truncate a timestamp to the start of its hour
pub fn floor_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts)
}

/// Midnight of a date
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::default())
}

/// First and last hour of the month containing `day`
pub fn month_hours(day: NaiveDate) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let first = day.with_day(1).ok_or_else(|| {
        ForecastError::ValidationError(format!("No first day for month of {}", day))
    })?;
    let next = first.checked_add_months(Months::new(1)).ok_or_else(|| {
        ForecastError::ValidationError(format!("Month after {} is out of range", first))
    })?;
    Ok((midnight(first), midnight(next) - Duration::hours(1)))
}

/// Sampling resolution of a telemetry series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Minutely,
    #[default]
    Hourly,
    Daily,
}

impl Resolution {
    /// Distance between two consecutive samples
    pub fn step(self) -> Duration {
        match self {
            Resolution::Minutely => Duration::minutes(1),
            Resolution::Hourly => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }

    /// Single-letter code understood by the telemetry export
    pub fn code(self) -> char {
        match self {
            Resolution::Minutely => 'n',
            Resolution::Hourly => 'h',
            Resolution::Daily => 'd',
        }
    }
}

/// One hour of the consumption series
///
/// A `None` value means the slot exists but has not been observed yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyObservation {
    pub timestamp: NaiveDateTime,
    pub true_power: Option<f64>,
    pub temperature: Option<f64>,
}

impl HourlyObservation {
    pub fn new(timestamp: NaiveDateTime, true_power: f64, temperature: f64) -> Self {
        Self {
            timestamp,
            true_power: Some(true_power),
            temperature: Some(temperature),
        }
    }

    /// An unobserved slot
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            true_power: None,
            temperature: None,
        }
    }
}

/// Value columns of the consumption series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesColumn {
    Power,
    Temperature,
}

impl SeriesColumn {
    pub fn get(self, obs: &HourlyObservation) -> Option<f64> {
        match self {
            SeriesColumn::Power => obs.true_power,
            SeriesColumn::Temperature => obs.temperature,
        }
    }

    pub fn set(self, obs: &mut HourlyObservation, value: Option<f64>) {
        match self {
            SeriesColumn::Power => obs.true_power = value,
            SeriesColumn::Temperature => obs.temperature = value,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SeriesColumn::Power => "power_true",
            SeriesColumn::Temperature => "temperature",
        }
    }
}

/// Working-day / day-off marker for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFlag {
    pub date: NaiveDate,
    pub is_day_off: bool,
}

/// One row of an assembled hourly frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyRecord {
    pub timestamp: NaiveDateTime,
    pub true_power: Option<f64>,
    pub temperature: Option<f64>,
    /// `None` when the calendar has no entry for the row's date
    pub day_off: Option<bool>,
}

/// A dense hourly grid of observations joined with the calendar by date
#[derive(Debug, Clone)]
pub struct HourlyFrame {
    start: NaiveDateTime,
    rows: Vec<HourlyRecord>,
}

impl HourlyFrame {
    /// Build the grid `[start, end]`; slots without an observation become
    /// all-null rows and day-off flags are joined on the row's date
    pub fn assemble(
        start: NaiveDateTime,
        end: NaiveDateTime,
        observations: &[HourlyObservation],
        calendar: &[CalendarFlag],
    ) -> Result<Self> {
        if start.minute() != 0 || start.second() != 0 {
            return Err(ForecastError::ValidationError(format!(
                "Frame start {} is not hour-aligned",
                start
            )));
        }
        if end < start {
            return Err(ForecastError::ValidationError(format!(
                "Frame end {} precedes start {}",
                end, start
            )));
        }

        let by_time: HashMap<NaiveDateTime, &HourlyObservation> =
            observations.iter().map(|o| (o.timestamp, o)).collect();
        let by_date: HashMap<NaiveDate, bool> =
            calendar.iter().map(|c| (c.date, c.is_day_off)).collect();

        let hours = (end - start).num_hours() as usize + 1;
        let mut rows = Vec::with_capacity(hours);
        for step in 0..hours {
            let timestamp = start + Duration::hours(step as i64);
            let obs = by_time.get(&timestamp);
            rows.push(HourlyRecord {
                timestamp,
                true_power: obs.and_then(|o| o.true_power),
                temperature: obs.and_then(|o| o.temperature),
                day_off: by_date.get(&timestamp.date()).copied(),
            });
        }

        Ok(Self { start, rows })
    }

    /// First timestamp of the grid
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Last timestamp of the grid
    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::hours(self.rows.len() as i64 - 1)
    }

    pub fn rows(&self) -> &[HourlyRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at an exact timestamp; `None` outside the grid or off the hour
    pub fn get(&self, ts: &NaiveDateTime) -> Option<&HourlyRecord> {
        let offset = *ts - self.start;
        if offset < Duration::zero() || offset.num_seconds() % 3600 != 0 {
            return None;
        }
        self.rows.get(offset.num_hours() as usize)
    }

    /// Observed powers at or before `until`, oldest first, skipping gaps
    pub fn observed_power_until(&self, until: &NaiveDateTime) -> Vec<f64> {
        self.rows
            .iter()
            .take_while(|r| r.timestamp <= *until)
            .filter_map(|r| r.true_power)
            .collect()
    }

    /// Export the frame as a polars DataFrame
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let timestamps: Vec<String> = self
            .rows
            .iter()
            .map(|r| format_timestamp(&r.timestamp))
            .collect();
        let power: Vec<Option<f64>> = self.rows.iter().map(|r| r.true_power).collect();
        let temperature: Vec<Option<f64>> = self.rows.iter().map(|r| r.temperature).collect();
        let day_off: Vec<Option<bool>> = self.rows.iter().map(|r| r.day_off).collect();

        let df = DataFrame::new(vec![
            Series::new("datetime", timestamps),
            Series::new("power_true", power),
            Series::new("temperature", temperature),
            Series::new("day_off", day_off),
        ])?;
        Ok(df)
    }
}

/// Data loader for consumption and calendar tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Read a CSV file into a DataFrame
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Ok(df)
    }

    /// Load hourly observations from a CSV export
    pub fn observations_from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<HourlyObservation>> {
        Self::observations_from_dataframe(&Self::read_csv(path)?)
    }

    /// Load the day-off calendar from a CSV export
    pub fn calendar_from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CalendarFlag>> {
        Self::calendar_from_dataframe(&Self::read_csv(path)?)
    }

    /// Convert a `{datetime, power, temperature}` frame into observations,
    /// sorted by timestamp
    pub fn observations_from_dataframe(df: &DataFrame) -> Result<Vec<HourlyObservation>> {
        let time_column = Self::detect_time_column(df)?;
        let power_column = Self::detect_column(df, &["power", "consumption", "load"])
            .ok_or_else(|| ForecastError::DataError("No power column found in data".to_string()))?;
        let temperature_column = Self::detect_column(df, &["temp"]).ok_or_else(|| {
            ForecastError::DataError("No temperature column found in data".to_string())
        })?;

        let timestamps = Self::column_as_timestamps(df, &time_column)?;
        let power = Self::column_as_f64(df, &power_column)?;
        let temperature = Self::column_as_f64(df, &temperature_column)?;

        let mut observations: Vec<HourlyObservation> = timestamps
            .into_iter()
            .zip(power)
            .zip(temperature)
            .map(|((timestamp, true_power), temperature)| HourlyObservation {
                timestamp,
                true_power,
                temperature,
            })
            .collect();
        observations.sort_by_key(|o| o.timestamp);
        Ok(observations)
    }

    /// Convert a `{datetime, day_off}` frame into calendar flags
    pub fn calendar_from_dataframe(df: &DataFrame) -> Result<Vec<CalendarFlag>> {
        let time_column = Self::detect_time_column(df)?;
        let flag_column = Self::detect_column(df, &["day_off", "off", "holiday"]).ok_or_else(
            || ForecastError::DataError("No day-off column found in data".to_string()),
        )?;

        let timestamps = Self::column_as_timestamps(df, &time_column)?;
        let flags = Self::column_as_flags(df, &flag_column)?;

        let mut calendar = Vec::with_capacity(timestamps.len());
        for (ts, flag) in timestamps.into_iter().zip(flags) {
            let is_day_off = flag.ok_or_else(|| {
                ForecastError::DataError(format!("Missing day-off flag for {}", ts.date()))
            })?;
            calendar.push(CalendarFlag {
                date: ts.date(),
                is_day_off,
            });
        }
        calendar.sort_by_key(|c| c.date);
        Ok(calendar)
    }

    /// Detect the time column in a DataFrame
    fn detect_time_column(df: &DataFrame) -> Result<String> {
        for name in df.get_column_names() {
            let lower_name = name.to_lowercase();
            if lower_name.contains("time") || lower_name.contains("date") || lower_name == "day" {
                return Ok(name.to_string());
            }
        }

        // fall back to the first column if it is temporal
        if let Some(first_col) = df.get_columns().first() {
            if first_col.dtype().is_temporal() {
                return Ok(first_col.name().to_string());
            }
        }

        Err(ForecastError::DataError(
            "No time column found in data".to_string(),
        ))
    }

    /// First column whose lowercase name contains one of the needles
    fn detect_column(df: &DataFrame, needles: &[&str]) -> Option<String> {
        let column_names = df.get_column_names();
        needles.iter().find_map(|needle| {
            column_names
                .iter()
                .find(|name| name.to_lowercase().contains(needle))
                .map(|name| name.to_string())
        })
    }

    fn column_as_timestamps(df: &DataFrame, column_name: &str) -> Result<Vec<NaiveDateTime>> {
        let col = df.column(column_name)?;

        match col.dtype() {
            DataType::Utf8 => col
                .utf8()?
                .into_iter()
                .map(|raw| {
                    raw.ok_or_else(|| {
                        ForecastError::DataError(format!("Null timestamp in '{}'", column_name))
                    })
                    .and_then(parse_timestamp)
                })
                .collect(),
            dtype if dtype.is_temporal() => {
                let millis = col
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                    .cast(&DataType::Int64)?;
                let result = millis
                    .i64()?
                    .into_iter()
                    .map(|ms| {
                        ms.and_then(NaiveDateTime::from_timestamp_millis)
                            .ok_or_else(|| {
                                ForecastError::DataError(format!(
                                    "Null or out-of-range timestamp in '{}'",
                                    column_name
                                ))
                            })
                    })
                    .collect();
                result
            }
            other => Err(ForecastError::DataError(format!(
                "Column '{}' of type {} cannot be read as timestamps",
                column_name, other
            ))),
        }
    }

    /// Helper method to get a column as optional f64 values
    fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<Option<f64>>> {
        let col = df.column(column_name).map_err(|e| {
            ForecastError::DataError(format!("Column '{}' not found: {}", column_name, e))
        })?;
        if !col.dtype().is_numeric() && col.dtype() != &DataType::Null {
            return Err(ForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64",
                column_name
            )));
        }
        let casted = col.cast(&DataType::Float64)?;
        let values = casted.f64()?.into_iter().collect();
        Ok(values)
    }

    fn column_as_flags(df: &DataFrame, column_name: &str) -> Result<Vec<Option<bool>>> {
        let col = df.column(column_name)?;
        if col.dtype() == &DataType::Boolean {
            return Ok(col.bool()?.into_iter().collect());
        }
        Ok(Self::column_as_f64(df, column_name)?
            .into_iter()
            .map(|v| v.map(|v| v != 0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_assemble_fills_gaps_and_joins_calendar() {
        let observations = vec![
            HourlyObservation::new(at(1, 22), 100.0, -3.0),
            HourlyObservation::new(at(2, 1), 110.0, -4.0),
        ];
        let calendar = vec![CalendarFlag {
            date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            is_day_off: true,
        }];

        let frame = HourlyFrame::assemble(at(1, 22), at(2, 1), &observations, &calendar).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.end(), at(2, 1));

        let gap = frame.get(&at(1, 23)).unwrap();
        assert_eq!(gap.true_power, None);
        assert_eq!(gap.day_off, None);

        let last = frame.get(&at(2, 1)).unwrap();
        assert_eq!(last.true_power, Some(110.0));
        assert_eq!(last.day_off, Some(true));

        assert!(frame.get(&at(1, 21)).is_none());
        assert!(frame.get(&at(2, 2)).is_none());
    }

    #[test]
    fn test_assemble_rejects_reversed_range() {
        assert!(HourlyFrame::assemble(at(2, 0), at(1, 0), &[], &[]).is_err());
    }

    #[test]
    fn test_month_hours() {
        let (first, last) = month_hours(NaiveDate::from_ymd_opt(2024, 2, 17).unwrap()).unwrap();
        assert_eq!(first.to_string(), "2024-02-01 00:00:00");
        assert_eq!(last.to_string(), "2024-02-29 23:00:00");
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        assert_eq!(parse_timestamp("2023-01-02 05:00:00").unwrap(), at(2, 5));
        assert_eq!(parse_timestamp("02.01.2023 05:00:00").unwrap(), at(2, 5));
        assert_eq!(parse_timestamp("2023-01-02").unwrap(), at(2, 0));
        assert!(parse_timestamp("yesterday").is_err());
    }
}
