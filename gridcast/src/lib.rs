//! # Gridcast
//!
//! A Rust library for next-day hourly electricity consumption forecasting.
//!
//! ## Features
//!
//! - Hourly consumption, temperature and day-off calendar handling
//! - Short spike repair for raw telemetry
//! - Lagged, cyclical and year-over-year feature construction
//! - Model adapters (gradient-boosted trees, GRU network, moving-average baseline)
//! - Ensemble forecasting with idempotent SQLite persistence
//! - Monthly MAE / MAPE quality reports
//!
//! ## Pipeline
//!
//! Telemetry is merged into the store by [`ingest::IngestionUpdater`], the
//! [`ensemble::EnsembleCaller`] runs every configured model on the same
//! history window, [`store::ForecastStore`] writes the members and their
//! mean, and [`monitor::QualityMonitor`] compares them with the truth once
//! the month is over.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Local;
//! use gridcast::config::PipelineConfig;
//! use gridcast::pipeline::DailyRun;
//! use gridcast::report::CsvReportWriter;
//! use gridcast::telemetry::CsvTelemetry;
//!
//! let config = PipelineConfig::from_file("gridcast.json")?;
//! let run = DailyRun::new(
//!     config.clone(),
//!     Box::new(CsvTelemetry::new("telemetry.csv").with_hour_ending(true)),
//!     Box::new(CsvReportWriter::new(&config.reports_dir)),
//! );
//! let report = run.run(Local::now().naive_local(), None)?;
//! println!("{}: {}", report.date, report.status);
//! # Ok::<(), gridcast::ForecastError>(())
//! ```

pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod ingest;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod repair;
pub mod report;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use crate::config::PipelineConfig;
pub use crate::data::{CalendarFlag, DataLoader, HourlyFrame, HourlyObservation};
pub use crate::ensemble::{EnsembleCaller, PredictionTable};
pub use crate::error::{ErrorKind, ForecastError};
pub use crate::features::{FeatureBuilder, FeatureKey, FeatureSpec};
pub use crate::models::{DayForecast, ModelAdapter, ModelKind, ModelSpec};
pub use crate::store::{ForecastStore, SqliteStore};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
