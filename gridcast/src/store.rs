//! SQLite persistence for observations, calendar flags and forecasts
//!
//! Every operation opens its own connection and closes it before returning;
//! writes run inside a single transaction so a failure leaves the store as
//! it was. Timestamps are stored as `%Y-%m-%d %H:%M:%S` text, which sorts
//! chronologically.

use crate::data::{format_timestamp, midnight, month_hours, parse_timestamp, CalendarFlag, HourlyObservation};
use crate::ensemble::{PredictionTable, ENSEMBLE_COLUMN};
use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS consumption (
        id INTEGER PRIMARY KEY,
        power_true REAL,
        temperature REAL,
        datetime TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS day_off (
        id INTEGER PRIMARY KEY,
        day_off INTEGER NOT NULL,
        datetime TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY,
        power_pred REAL NOT NULL,
        model TEXT NOT NULL,
        datetime TEXT NOT NULL,
        UNIQUE (datetime, model)
    );
";

/// One persisted forecast value
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub timestamp: NaiveDateTime,
    pub model: String,
    pub predicted_power: f64,
}

/// Handle to the SQLite file; holds no open connection
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store and make sure the tables exist
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.connect()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Timestamp of the latest non-null true power
    pub fn latest_observed_power(&self) -> Result<Option<NaiveDateTime>> {
        let conn = self.connect()?;
        let raw: Option<String> = conn.query_row(
            "SELECT MAX(datetime) FROM consumption WHERE power_true IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        raw.as_deref().map(parse_timestamp).transpose()
    }

    /// Latest date with a day-off flag
    pub fn latest_calendar_date(&self) -> Result<Option<NaiveDate>> {
        let conn = self.connect()?;
        let raw: Option<String> =
            conn.query_row("SELECT MAX(datetime) FROM day_off", [], |row| row.get(0))?;
        Ok(raw.as_deref().map(parse_timestamp).transpose()?.map(|ts| ts.date()))
    }

    /// Consumption rows in `[start, end]`, null slots included
    pub fn load_observations(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<HourlyObservation>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT datetime, power_true, temperature
            FROM consumption
            WHERE datetime >= ?1 AND datetime <= ?2
            ORDER BY datetime ASC
            ",
        )?;
        let rows = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(ts, true_power, temperature)| {
                Ok(HourlyObservation {
                    timestamp: parse_timestamp(&ts)?,
                    true_power,
                    temperature,
                })
            })
            .collect()
    }

    /// Day-off flags for dates in `[first, last]`
    pub fn load_calendar(&self, first: NaiveDate, last: NaiveDate) -> Result<Vec<CalendarFlag>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT datetime, day_off
            FROM day_off
            WHERE datetime >= ?1 AND datetime < ?2
            ORDER BY datetime ASC
            ",
        )?;
        let rows = stmt
            .query_map(
                params![
                    format_timestamp(&midnight(first)),
                    format_timestamp(&midnight(last + Duration::days(1)))
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(ts, flag)| {
                Ok(CalendarFlag {
                    date: parse_timestamp(&ts)?.date(),
                    is_day_off: flag == 1,
                })
            })
            .collect()
    }

    /// Insert observations whose timestamp is not stored yet, then extend
    /// the table with empty slots up to `extend_to`. Returns inserted rows.
    pub fn append_observations(
        &self,
        observations: &[HourlyObservation],
        extend_to: Option<NaiveDateTime>,
    ) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO consumption (power_true, temperature, datetime)
                 VALUES (?1, ?2, ?3)",
            )?;
            for obs in observations {
                inserted += stmt.execute(params![
                    obs.true_power,
                    obs.temperature,
                    format_timestamp(&obs.timestamp)
                ])?;
            }

            if let Some(end) = extend_to {
                let last: Option<String> =
                    tx.query_row("SELECT MAX(datetime) FROM consumption", [], |row| row.get(0))?;
                if let Some(last) = last.as_deref().map(parse_timestamp).transpose()? {
                    let mut ts = last + Duration::hours(1);
                    while ts <= end {
                        inserted += stmt.execute(params![
                            Option::<f64>::None,
                            Option::<f64>::None,
                            format_timestamp(&ts)
                        ])?;
                        ts += Duration::hours(1);
                    }
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert or overwrite day-off flags
    pub fn upsert_calendar(&self, flags: &[CalendarFlag]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO day_off (day_off, datetime) VALUES (?1, ?2)
                 ON CONFLICT(datetime) DO UPDATE SET day_off = excluded.day_off",
            )?;
            for flag in flags {
                written += stmt.execute(params![
                    flag.is_day_off as i64,
                    format_timestamp(&midnight(flag.date))
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Merge observations by timestamp: new slots are inserted, existing
    /// slots only get their null cells filled. Returns changed rows.
    pub fn fill_missing_observations(&self, observations: &[HourlyObservation]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO consumption (power_true, temperature, datetime)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(datetime) DO UPDATE SET
                    power_true = COALESCE(consumption.power_true, excluded.power_true),
                    temperature = COALESCE(consumption.temperature, excluded.temperature)
                WHERE consumption.power_true IS NULL OR consumption.temperature IS NULL
                ",
            )?;
            for obs in observations {
                changed += stmt.execute(params![
                    obs.true_power,
                    obs.temperature,
                    format_timestamp(&obs.timestamp)
                ])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Whether `model` already has a forecast stored at `timestamp`
    pub fn has_prediction(&self, timestamp: NaiveDateTime, model: &str) -> Result<bool> {
        let conn = self.connect()?;
        has_prediction(&conn, timestamp, model)
    }

    /// Models with at least one forecast in `[start, end]`, sorted by name
    pub fn distinct_models(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT model FROM predictions
             WHERE datetime >= ?1 AND datetime <= ?2
             ORDER BY model ASC",
        )?;
        let models = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(models)
    }

    /// Non-null true power in `[start, end]`
    pub fn observed_power(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<(NaiveDateTime, f64)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT datetime, power_true FROM consumption
             WHERE datetime >= ?1 AND datetime <= ?2 AND power_true IS NOT NULL
             ORDER BY datetime ASC",
        )?;
        let rows = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(ts, power)| Ok((parse_timestamp(&ts)?, power)))
            .collect()
    }

    /// Forecast records in `[start, end]`
    pub fn predictions_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<ForecastRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT datetime, model, power_pred FROM predictions
             WHERE datetime >= ?1 AND datetime <= ?2
             ORDER BY datetime ASC, model ASC",
        )?;
        let rows = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(ts, model, predicted_power)| {
                Ok(ForecastRecord {
                    timestamp: parse_timestamp(&ts)?,
                    model,
                    predicted_power,
                })
            })
            .collect()
    }

    /// Dates of the month with observed power but no forecast of any model
    pub fn dates_missing_forecast(&self, month: NaiveDate) -> Result<Vec<NaiveDate>> {
        let (start, end) = month_hours(month)?;
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT observed.date
            FROM (
                SELECT DATE(datetime) AS date FROM consumption
                WHERE datetime >= ?1 AND datetime <= ?2 AND power_true IS NOT NULL
                GROUP BY DATE(datetime)
            ) AS observed
            LEFT JOIN (
                SELECT DATE(datetime) AS date FROM predictions
                WHERE datetime >= ?1 AND datetime <= ?2
                GROUP BY DATE(datetime)
            ) AS forecast ON observed.date = forecast.date
            WHERE forecast.date IS NULL
            ORDER BY observed.date ASC
            ",
        )?;
        let dates = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        dates
            .iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .map_err(|e| ForecastError::DataError(format!("Bad date '{}': {}", d, e)))
            })
            .collect()
    }
}

fn has_prediction(conn: &Connection, timestamp: NaiveDateTime, model: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM predictions WHERE datetime = ?1 AND model = ?2",
            params![format_timestamp(&timestamp), model],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Outcome of a persist call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    /// Columns written, ensemble included
    pub inserted: Vec<String>,
    /// Columns already stored for the date and left untouched
    pub skipped: Vec<String>,
    pub rows_inserted: usize,
}

/// Idempotent writer of daily forecasts
#[derive(Debug, Clone)]
pub struct ForecastStore {
    store: SqliteStore,
}

impl ForecastStore {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Store every member column and their hourly mean under `ensemble`.
    ///
    /// A column already present for the first hour of the date is skipped
    /// as a whole and reported, never overwritten. Hours of a partially
    /// stored column are kept and only the missing ones are inserted.
    pub fn persist(&self, predictions: &PredictionTable) -> Result<PersistReport> {
        let date = predictions.date();
        let hours = crate::models::DayForecast::timestamps(date);
        let first = hours[0];

        let ensemble = predictions.ensemble()?;
        let mut columns: Vec<(&str, &[f64])> = predictions
            .columns()
            .iter()
            .map(|(name, forecast)| (name.as_str(), forecast.values()))
            .collect();
        columns.push((ENSEMBLE_COLUMN, ensemble.values()));

        let mut report = PersistReport::default();
        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO predictions (power_pred, model, datetime) VALUES (?1, ?2, ?3)",
            )?;
            for (model, values) in columns {
                if has_prediction(&tx, first, model)? {
                    warn!(
                        component = "store",
                        event = "store.persist.duplicate",
                        model,
                        %date,
                        "forecast already stored, skipping"
                    );
                    report.skipped.push(model.to_string());
                    continue;
                }
                for (ts, value) in hours.iter().zip(values) {
                    report.rows_inserted += stmt.execute(params![value, model, format_timestamp(ts)])?;
                }
                report.inserted.push(model.to_string());
            }
        }
        tx.commit()?;

        info!(
            component = "store",
            event = "store.persist.done",
            %date,
            rows_inserted = report.rows_inserted,
            skipped = report.skipped.len()
        );
        Ok(report)
    }
}
