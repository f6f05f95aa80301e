use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use gridcast::config::ModelEntry;
use gridcast::pipeline::{DailyRun, MonthlyRun};
use gridcast::report::CsvReportWriter;
use gridcast::telemetry::CsvTelemetry;
use gridcast::{CalendarFlag, HourlyObservation, ModelKind, PipelineConfig, SqliteStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::fs::File;
use std::io::Write;

fn hour(date: NaiveDate, h: u32) -> NaiveDateTime {
    date.and_hms_opt(h, 0, 0).unwrap_or_default()
}

fn load_profile(ts: NaiveDateTime, rng: &mut StdRng) -> HourlyObservation {
    let h = (ts - hour(ts.date(), 0)).num_hours() as f64;
    let weekend = matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
    let power = 1200.0 + 180.0 * (2.0 * PI * h / 24.0).sin() - if weekend { 120.0 } else { 0.0 }
        + rng.gen_range(-10.0..10.0);
    let temperature = 6.0 + 12.0 * (2.0 * PI * (ts.ordinal() as f64 - 100.0) / 365.25).sin();
    HourlyObservation::new(ts, power, temperature)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridcast=info".into()),
        )
        .init();

    let workdir = tempfile::tempdir()?;
    let mut config = PipelineConfig {
        store_path: workdir.path().join("gridcast.db"),
        reports_dir: workdir.path().join("reports"),
        monitor_dir: workdir.path().join("monitoring"),
        ..PipelineConfig::default()
    };
    config.models = vec![
        ModelEntry {
            kind: ModelKind::MovingAverage,
            name: "last_day".to_string(),
            location: Default::default(),
        },
    ];
    config.moving_average_window = 24;
    config.validate()?;

    // Seed one year of history, stopping early on the morning before the forecast date
    let mut rng = StdRng::seed_from_u64(42);
    let first = NaiveDate::from_ymd_opt(2023, 3, 1).ok_or("bad date")?;
    let today = NaiveDate::from_ymd_opt(2024, 3, 14).ok_or("bad date")?;
    let mut history = Vec::new();
    let mut ts = hour(first, 0);
    while ts <= hour(today, 5) {
        history.push(load_profile(ts, &mut rng));
        ts += Duration::hours(1);
    }
    let calendar: Vec<CalendarFlag> = (0..=(today - first).num_days() + 1)
        .map(|offset| {
            let date = first + Duration::days(offset);
            CalendarFlag {
                date,
                is_day_off: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            }
        })
        .collect();

    let store = SqliteStore::open_or_create(&config.store_path)?;
    store.append_observations(&history, Some(hour(today + Duration::days(1), 23)))?;
    store.upsert_calendar(&calendar)?;
    println!("Seeded {} hours of history", history.len());

    // Telemetry export for today, labelled by hour ending, with one bad reading
    let telemetry_path = workdir.path().join("telemetry.csv");
    let mut telemetry = File::create(&telemetry_path)?;
    writeln!(telemetry, "datetime,power_true,temperature")?;
    for h in 0..24 {
        let mut obs = load_profile(hour(today, h), &mut rng);
        if h == 8 {
            obs.true_power = obs.true_power.map(|p| p + 2000.0);
        }
        let label = obs.timestamp + Duration::hours(1);
        writeln!(
            telemetry,
            "{},{:.1},{:.1}",
            label.format("%Y-%m-%d %H:%M:%S"),
            obs.true_power.unwrap_or_default(),
            obs.temperature.unwrap_or_default()
        )?;
    }

    let daily = DailyRun::new(
        config.clone(),
        Box::new(CsvTelemetry::new(&telemetry_path).with_hour_ending(true)),
        Box::new(CsvReportWriter::new(&config.reports_dir)),
    );
    let report = daily.run(hour(today, 13), None)?;
    println!("Ingest: {:?}", report.ingest);
    println!("Forecast for {}: {}", report.date, report.status);

    let published = CsvReportWriter::new(&config.reports_dir).file_path(report.date);
    if published.exists() {
        println!("{}", std::fs::read_to_string(published)?);
    }

    // Evaluate March once the month is over
    let monthly = MonthlyRun::new(config.clone()).run(today, Some(today))?;
    println!("Backfilled {} dates", monthly.backfilled.len());
    if let Some(quality) = monthly.quality {
        print!("{}", quality);
    }

    Ok(())
}
