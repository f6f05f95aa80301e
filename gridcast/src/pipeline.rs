//! Daily forecast run and monthly backfill-and-monitor run

use crate::config::PipelineConfig;
use crate::ensemble::{EnsembleCaller, ENSEMBLE_COLUMN};
use crate::error::{ErrorKind, Result};
use crate::ingest::{IngestOutcome, IngestionUpdater};
use crate::models::{DayForecast, ModelSpec};
use crate::monitor::{previous_month, QualityMonitor, QualityReport};
use crate::report::ReportSink;
use crate::store::{ForecastStore, PersistReport, SqliteStore};
use crate::telemetry::TelemetrySource;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fmt;
use tracing::{info, warn};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// The store could not support a forecast; nothing was written
    NoForecast { reason: String },
    /// The work was already done
    Skipped { reason: String },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::NoForecast { reason } => write!(f, "no forecast: {}", reason),
            RunStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub ingest: IngestOutcome,
    pub status: RunStatus,
    pub persisted: Option<PersistReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReport {
    pub month: NaiveDate,
    pub status: RunStatus,
    /// Dates forecast during the backfill
    pub backfilled: Vec<NaiveDate>,
    pub quality: Option<QualityReport>,
}

enum DateOutcome {
    Persisted {
        report: PersistReport,
        ensemble: DayForecast,
    },
    Unmet(String),
}

/// Forecast and persist one date; unmet preconditions are not an error
fn forecast_and_persist(
    caller: &EnsembleCaller,
    store: &ForecastStore,
    date: NaiveDate,
    specs: &[ModelSpec],
) -> Result<DateOutcome> {
    let table = match caller.forecast(store.store(), date, specs) {
        Ok(table) => table,
        Err(err) if err.kind() == ErrorKind::PreconditionUnmet => {
            return Ok(DateOutcome::Unmet(err.to_string()))
        }
        Err(err) => return Err(err),
    };
    let report = store.persist(&table)?;
    Ok(DateOutcome::Persisted {
        report,
        ensemble: table.ensemble()?,
    })
}

/// Update the store, forecast the target date, persist and publish
#[derive(Debug)]
pub struct DailyRun {
    config: PipelineConfig,
    store: SqliteStore,
    source: Box<dyn TelemetrySource>,
    sink: Box<dyn ReportSink>,
    specs: Vec<ModelSpec>,
}

impl DailyRun {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn TelemetrySource>,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        let store = SqliteStore::new(&config.store_path);
        let specs = config.model_specs();
        Self {
            config,
            store,
            source,
            sink,
            specs,
        }
    }

    /// Replace the configured ensemble members
    pub fn with_models(mut self, specs: Vec<ModelSpec>) -> Self {
        self.specs = specs;
        self
    }

    /// Run at wall-clock `now` for `target` (default: the day after `now`)
    pub fn run(&self, now: NaiveDateTime, target: Option<NaiveDate>) -> Result<DailyReport> {
        let date = target.unwrap_or(now.date() + Duration::days(1));
        self.store.init_schema()?;

        let updater = IngestionUpdater::new(
            self.config.repair.power,
            self.config.repair.temperature,
            self.config.cutoff_hour,
        );
        let ingest = match updater.update(&self.store, self.source.as_ref(), now) {
            Ok(outcome) => outcome,
            Err(err) if !err.is_fatal() => IngestOutcome::Unavailable {
                reason: err.to_string(),
            },
            Err(err) => return Err(err),
        };

        let caller = EnsembleCaller::new(self.config.anchor_hour);
        let store = ForecastStore::new(self.store.clone());
        let (persisted, ensemble) = match forecast_and_persist(&caller, &store, date, &self.specs)? {
            DateOutcome::Persisted { report, ensemble } => (report, ensemble),
            DateOutcome::Unmet(reason) => {
                warn!(component = "pipeline", event = "daily.no_forecast", %date, %reason);
                return Ok(DailyReport {
                    date,
                    ingest,
                    status: RunStatus::NoForecast { reason },
                    persisted: None,
                });
            }
        };

        self.sink.publish(date, &ensemble)?;
        info!(
            component = "pipeline",
            event = "daily.done",
            %date,
            column = ENSEMBLE_COLUMN,
            rows = persisted.rows_inserted
        );
        Ok(DailyReport {
            date,
            ingest,
            status: RunStatus::Completed,
            persisted: Some(persisted),
        })
    }
}

/// Backfill missing forecasts of a month and write its quality report
#[derive(Debug)]
pub struct MonthlyRun {
    config: PipelineConfig,
    store: SqliteStore,
    specs: Vec<ModelSpec>,
}

impl MonthlyRun {
    pub fn new(config: PipelineConfig) -> Self {
        let store = SqliteStore::new(&config.store_path);
        let specs = config.model_specs();
        Self {
            config,
            store,
            specs,
        }
    }

    pub fn with_models(mut self, specs: Vec<ModelSpec>) -> Self {
        self.specs = specs;
        self
    }

    /// Run for `month` (default: the month before `today`)
    pub fn run(&self, today: NaiveDate, month: Option<NaiveDate>) -> Result<MonthlyReport> {
        let month = match month {
            Some(day) => crate::data::month_hours(day)?.0.date(),
            None => previous_month(today)?,
        };
        let path = QualityReport::file_path(&self.config.monitor_dir, month);
        if path.exists() {
            info!(component = "pipeline", event = "monthly.skip", path = %path.display());
            return Ok(MonthlyReport {
                month,
                status: RunStatus::Skipped {
                    reason: format!("{} already exists", path.display()),
                },
                backfilled: Vec::new(),
                quality: None,
            });
        }

        self.store.init_schema()?;
        let caller = EnsembleCaller::new(self.config.anchor_hour);
        let store = ForecastStore::new(self.store.clone());

        let mut backfilled = Vec::new();
        for date in self.store.dates_missing_forecast(month)? {
            match forecast_and_persist(&caller, &store, date, &self.specs)? {
                DateOutcome::Persisted { .. } => backfilled.push(date),
                DateOutcome::Unmet(reason) => {
                    warn!(component = "pipeline", event = "monthly.backfill.skip", %date, %reason)
                }
            }
        }

        let quality = QualityMonitor::new().evaluate(&self.store, month)?;
        let written = quality.write_to(&self.config.monitor_dir)?;
        info!(
            component = "pipeline",
            event = "monthly.done",
            month = %quality.period(),
            backfilled = backfilled.len(),
            path = %written.display()
        );
        Ok(MonthlyReport {
            month,
            status: RunStatus::Completed,
            backfilled,
            quality: Some(quality),
        })
    }
}
