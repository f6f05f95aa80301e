#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use gridcast::data::HourlyFrame;
use gridcast::error::Result;
use gridcast::models::{DayForecast, ModelAdapter, ModelKind, MovingAverageAdapter};
use gridcast::store::SqliteStore;
use gridcast::{CalendarFlag, HourlyObservation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    day(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

/// Smooth daily load profile with a little seeded noise
pub fn synthetic_series(start: NaiveDateTime, end: NaiveDateTime, seed: u64) -> Vec<HourlyObservation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut series = Vec::new();
    let mut ts = start;
    while ts <= end {
        let hour = (ts - gridcast::data::midnight(ts.date())).num_hours() as f64;
        let weekend = matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
        let power = 1000.0 + 150.0 * (2.0 * PI * hour / 24.0).sin()
            - if weekend { 80.0 } else { 0.0 }
            + rng.gen_range(-5.0..5.0);
        let temperature =
            8.0 + 10.0 * (2.0 * PI * ts.ordinal() as f64 / 365.25).sin() + rng.gen_range(-0.5..0.5);
        series.push(HourlyObservation::new(ts, power, temperature));
        ts += Duration::hours(1);
    }
    series
}

/// Weekends are days off
pub fn weekend_calendar(first: NaiveDate, last: NaiveDate) -> Vec<CalendarFlag> {
    let mut flags = Vec::new();
    let mut date = first;
    while date <= last {
        flags.push(CalendarFlag {
            date,
            is_day_off: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        });
        date += Duration::days(1);
    }
    flags
}

/// Store with synthetic observations `[start, observed_until]`, empty slots
/// up to the end of `calendar_until` and weekend flags through `calendar_until`
pub fn seeded_store(
    dir: &TempDir,
    start: NaiveDateTime,
    observed_until: NaiveDateTime,
    calendar_until: NaiveDate,
) -> (SqliteStore, Vec<HourlyObservation>) {
    let store = SqliteStore::open_or_create(dir.path().join("gridcast.db")).unwrap();
    let series = synthetic_series(start, observed_until, 7);
    let slots_end = gridcast::data::midnight(calendar_until) + Duration::hours(23);
    store.append_observations(&series, Some(slots_end)).unwrap();
    store
        .upsert_calendar(&weekend_calendar(start.date(), calendar_until))
        .unwrap();
    (store, series)
}

/// Frame built directly from synthetic data, no store involved
pub fn synthetic_frame(date: NaiveDate, observed_until: NaiveDateTime) -> (HourlyFrame, Vec<HourlyObservation>) {
    let start = at(date.year() - 1, date.month(), date.day(), 0);
    let end = gridcast::data::midnight(date) + Duration::hours(23);
    let series = synthetic_series(start, observed_until, 11);
    let calendar = weekend_calendar(start.date(), date);
    (HourlyFrame::assemble(start, end, &series, &calendar).unwrap(), series)
}

/// Mean of the last 24 true powers at or before `anchor`
pub fn trailing_mean(series: &[HourlyObservation], anchor: NaiveDateTime) -> f64 {
    let values: Vec<f64> = series
        .iter()
        .filter(|o| o.timestamp <= anchor)
        .filter_map(|o| o.true_power)
        .collect();
    let tail = &values[values.len() - 24..];
    tail.iter().sum::<f64>() / 24.0
}

/// Moving-average model that counts its invocations
#[derive(Debug, Clone)]
pub struct CountingAdapter {
    inner: MovingAverageAdapter,
    pub calls: Arc<AtomicUsize>,
}

impl CountingAdapter {
    pub fn new() -> Self {
        Self {
            inner: MovingAverageAdapter::new(24),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelAdapter for CountingAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::MovingAverage
    }

    fn predict(&self, history: &HourlyFrame, anchor: NaiveDateTime, location: &Path) -> Result<DayForecast> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(history, anchor, location)
    }
}
