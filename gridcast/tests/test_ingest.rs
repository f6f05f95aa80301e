mod common;

use chrono::NaiveDateTime;
use common::{at, day, seeded_store, synthetic_series};
use gridcast::data::Resolution;
use gridcast::error::Result;
use gridcast::ingest::{IngestOutcome, IngestState, IngestionUpdater};
use gridcast::repair::RepairSettings;
use gridcast::store::SqliteStore;
use gridcast::telemetry::{observations_to_dataframe, CsvTelemetry, TelemetrySource};
use gridcast::{ForecastError, HourlyObservation};
use polars::prelude::{DataFrame, NamedFrom};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::{NamedTempFile, TempDir};

#[derive(Debug)]
struct StubTelemetry {
    series: Vec<HourlyObservation>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubTelemetry {
    fn serving(series: Vec<HourlyObservation>) -> Self {
        Self {
            series,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            series: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TelemetrySource for StubTelemetry {
    fn fetch(&self, begin: NaiveDateTime, end: NaiveDateTime, _: Resolution) -> Result<DataFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ForecastError::CollaboratorUnavailable(
                "telemetry endpoint timed out".to_string(),
            ));
        }
        let window: Vec<_> = self
            .series
            .iter()
            .filter(|o| o.timestamp >= begin && o.timestamp <= end)
            .copied()
            .collect();
        observations_to_dataframe(&window)
    }
}

/// Serves the same frame for every request
#[derive(Debug)]
struct FrameTelemetry(DataFrame);

impl TelemetrySource for FrameTelemetry {
    fn fetch(&self, _: NaiveDateTime, _: NaiveDateTime, _: Resolution) -> Result<DataFrame> {
        Ok(self.0.clone())
    }
}

fn updater() -> IngestionUpdater {
    IngestionUpdater::new(
        RepairSettings::new(650.0, 1),
        RepairSettings::new(10.0, 1),
        12,
    )
}

/// Telemetry for March 10 with a one-hour spike at 08:00
fn spiky_day() -> Vec<HourlyObservation> {
    let mut series = synthetic_series(at(2024, 3, 10, 0), at(2024, 3, 10, 23), 3);
    series[8].true_power = series[8].true_power.map(|p| p + 900.0);
    series
}

fn stale_store(dir: &TempDir) -> SqliteStore {
    seeded_store(dir, at(2024, 3, 1, 0), at(2024, 3, 10, 5), day(2024, 3, 11)).0
}

#[test]
fn test_empty_store_has_no_history() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_or_create(dir.path().join("empty.db")).unwrap();
    let source = StubTelemetry::serving(spiky_day());

    let outcome = updater().update(&store, &source, at(2024, 3, 10, 14)).unwrap();
    assert_eq!(outcome, IngestOutcome::NoHistory);
    assert_eq!(source.calls(), 0);
}

#[test]
fn test_current_store_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let (store, _) = seeded_store(&dir, at(2024, 3, 1, 0), at(2024, 3, 10, 12), day(2024, 3, 11));
    let source = StubTelemetry::serving(spiky_day());

    let now = at(2024, 3, 10, 14);
    assert_eq!(
        updater().state(&store, now).unwrap(),
        IngestState::Current {
            last: at(2024, 3, 10, 12)
        }
    );
    assert_eq!(updater().update(&store, &source, now).unwrap(), IngestOutcome::Current);
    assert_eq!(source.calls(), 0);
}

#[test]
fn test_stale_store_is_repaired_and_filled() {
    let dir = TempDir::new().unwrap();
    let store = stale_store(&dir);
    let telemetry = spiky_day();
    let source = StubTelemetry::serving(telemetry.clone());

    let now = at(2024, 3, 10, 14);
    assert_eq!(
        updater().state(&store, now).unwrap(),
        IngestState::Stale {
            last: at(2024, 3, 10, 5),
            cutoff: at(2024, 3, 10, 12)
        }
    );

    let outcome = updater().update(&store, &source, now).unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Updated {
            rows: 7,
            from: at(2024, 3, 10, 6),
            to: at(2024, 3, 10, 12)
        }
    );
    assert_eq!(source.calls(), 1);
    assert_eq!(store.latest_observed_power().unwrap(), Some(at(2024, 3, 10, 12)));

    let stored = store
        .load_observations(at(2024, 3, 10, 6), at(2024, 3, 10, 13))
        .unwrap();
    // the spike takes the value of the hour before it
    assert_eq!(stored[2].true_power, telemetry[7].true_power);
    assert_eq!(stored[3].true_power, telemetry[9].true_power);
    assert_eq!(stored[7].true_power, None);
}

#[test]
fn test_source_failure_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = stale_store(&dir);
    let source = StubTelemetry::failing();

    let outcome = updater().update(&store, &source, at(2024, 3, 10, 14)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Unavailable { ref reason } if reason.contains("timed out")));
    assert_eq!(store.latest_observed_power().unwrap(), Some(at(2024, 3, 10, 5)));
}

#[test]
fn test_empty_telemetry_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let store = stale_store(&dir);
    let source = StubTelemetry::serving(Vec::new());

    let outcome = updater().update(&store, &source, at(2024, 3, 10, 14)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Unavailable { .. }));
    assert_eq!(store.latest_observed_power().unwrap(), Some(at(2024, 3, 10, 5)));
}

#[test]
fn test_unreadable_telemetry_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let store = stale_store(&dir);
    let frame = polars::df!(
        "datetime" => ["2024-03-10 05:00:00", "2024-03-10 06:00:00"],
        "status" => ["offline", "offline"]
    )
    .unwrap();

    let outcome = updater()
        .update(&store, &FrameTelemetry(frame), at(2024, 3, 10, 14))
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Unavailable { ref reason } if reason.contains("power")));
    assert_eq!(store.latest_observed_power().unwrap(), Some(at(2024, 3, 10, 5)));
}

#[test]
fn test_context_hour_only_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let store = stale_store(&dir);
    let source = StubTelemetry::serving(synthetic_series(at(2024, 3, 10, 5), at(2024, 3, 10, 5), 3));

    let outcome = updater().update(&store, &source, at(2024, 3, 10, 14)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Unavailable { .. }));
    assert_eq!(source.calls(), 1);
    assert_eq!(store.latest_observed_power().unwrap(), Some(at(2024, 3, 10, 5)));
}

#[test]
fn test_csv_telemetry_hour_ending() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "datetime,power_true,temperature").unwrap();
    writeln!(file, "2024-03-10 01:00:00,1000.0,4.0").unwrap();
    writeln!(file, "2024-03-10 02:00:00,1010.0,4.5").unwrap();
    writeln!(file, "2024-03-10 03:00:00,1020.0,5.0").unwrap();

    let source = CsvTelemetry::new(file.path()).with_hour_ending(true);
    let df = source
        .fetch(at(2024, 3, 10, 0), at(2024, 3, 10, 1), Resolution::Hourly)
        .unwrap();
    assert_eq!(df.height(), 2);
    let observations = gridcast::DataLoader::observations_from_dataframe(&df).unwrap();
    assert_eq!(observations[0], HourlyObservation::new(at(2024, 3, 10, 0), 1000.0, 4.0));

    assert!(source
        .fetch(at(2024, 3, 10, 2), at(2024, 3, 10, 1), Resolution::Hourly)
        .is_err());

    let missing = CsvTelemetry::new("/nonexistent/telemetry.csv");
    let err = missing
        .fetch(at(2024, 3, 10, 0), at(2024, 3, 10, 1), Resolution::Hourly)
        .unwrap_err();
    assert!(!err.is_fatal());
}
