mod common;

use approx::assert_relative_eq;
use common::{at, day, seeded_store, trailing_mean, CountingAdapter};
use gridcast::error::ErrorKind;
use gridcast::models::{ModelSpec, MovingAverageAdapter};
use gridcast::{EnsembleCaller, ForecastError};
use tempfile::TempDir;

fn members(counter: &CountingAdapter) -> Vec<ModelSpec> {
    vec![
        ModelSpec::new(Box::new(counter.clone()), "counted", "unused"),
        ModelSpec::new(Box::new(MovingAverageAdapter::new(48)), "ma48", "unused"),
    ]
}

#[test]
fn test_forecast_runs_every_member() {
    let dir = TempDir::new().unwrap();
    let (store, series) = seeded_store(&dir, at(2023, 3, 1, 0), at(2024, 3, 14, 12), day(2024, 3, 15));
    let counter = CountingAdapter::new();
    let caller = EnsembleCaller::default();

    caller.check_preconditions(&store, day(2024, 3, 15)).unwrap();
    let table = caller.forecast(&store, day(2024, 3, 15), &members(&counter)).unwrap();

    assert_eq!(counter.calls(), 1);
    assert_eq!(table.date(), day(2024, 3, 15));
    assert_eq!(table.names(), vec!["counted", "ma48"]);
    let expected = trailing_mean(&series, at(2024, 3, 14, 11));
    for value in table.get("counted").unwrap().values() {
        assert_relative_eq!(*value, expected, epsilon = 1e-9);
    }

    let df = table.to_dataframe().unwrap();
    assert_eq!(df.shape(), (24, 4));
}

#[test]
fn test_short_history_runs_no_model() {
    let dir = TempDir::new().unwrap();
    // coverage ends three days before the forecast date
    let (store, _) = seeded_store(&dir, at(2023, 3, 1, 0), at(2024, 3, 12, 23), day(2024, 3, 15));
    let counter = CountingAdapter::new();

    let err = EnsembleCaller::default()
        .forecast(&store, day(2024, 3, 15), &members(&counter))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionUnmet);
    assert_eq!(counter.calls(), 0);
}

#[test]
fn test_missing_calendar_runs_no_model() {
    let dir = TempDir::new().unwrap();
    let (store, _) = seeded_store(&dir, at(2023, 3, 1, 0), at(2024, 3, 14, 12), day(2024, 3, 14));
    let counter = CountingAdapter::new();

    let err = EnsembleCaller::default()
        .forecast(&store, day(2024, 3, 15), &members(&counter))
        .unwrap_err();
    assert!(matches!(err, ForecastError::PreconditionUnmet(ref msg) if msg.contains("calendar")));
    assert_eq!(counter.calls(), 0);
}

#[test]
fn test_member_names_are_validated() {
    let dir = TempDir::new().unwrap();
    let (store, _) = seeded_store(&dir, at(2024, 3, 1, 0), at(2024, 3, 14, 12), day(2024, 3, 15));
    let caller = EnsembleCaller::default();
    let date = day(2024, 3, 15);

    assert!(caller.forecast(&store, date, &[]).is_err());

    let reserved = vec![ModelSpec::new(Box::new(MovingAverageAdapter::new(24)), "ensemble", "")];
    assert_eq!(
        caller.forecast(&store, date, &reserved).unwrap_err().kind(),
        ErrorKind::Failure
    );

    let twice = vec![
        ModelSpec::new(Box::new(MovingAverageAdapter::new(24)), "ma", ""),
        ModelSpec::new(Box::new(MovingAverageAdapter::new(24)), "ma", ""),
    ];
    assert!(caller.forecast(&store, date, &twice).is_err());
}
