mod common;

use common::{at, day};
use gridcast::data::{month_hours, DataLoader, Resolution};
use gridcast::{CalendarFlag, HourlyFrame, HourlyObservation};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_observations_from_csv() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "datetime,power_true,temperature").unwrap();
    writeln!(file, "2024-01-01 02:00:00,905.5,-4.0").unwrap();
    writeln!(file, "2024-01-01 00:00:00,930.0,-3.0").unwrap();
    writeln!(file, "2024-01-01 01:00:00,,-3.5").unwrap();

    let observations = DataLoader::observations_from_csv(file.path()).unwrap();

    assert_eq!(observations.len(), 3);
    // sorted by timestamp
    assert_eq!(observations[0], HourlyObservation::new(at(2024, 1, 1, 0), 930.0, -3.0));
    assert_eq!(observations[1].true_power, None);
    assert_eq!(observations[1].temperature, Some(-3.5));
    assert_eq!(observations[2].timestamp, at(2024, 1, 1, 2));
}

#[test]
fn test_calendar_from_csv() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,day_off").unwrap();
    writeln!(file, "2024-01-02,0").unwrap();
    writeln!(file, "2024-01-01,1").unwrap();

    let calendar = DataLoader::calendar_from_csv(file.path()).unwrap();
    assert_eq!(
        calendar,
        vec![
            CalendarFlag { date: day(2024, 1, 1), is_day_off: true },
            CalendarFlag { date: day(2024, 1, 2), is_day_off: false },
        ]
    );
}

#[test]
fn test_loader_errors() {
    assert!(DataLoader::observations_from_csv("nonexistent_file.csv").is_err());

    let mut no_power = NamedTempFile::new().unwrap();
    writeln!(no_power, "datetime,temperature").unwrap();
    writeln!(no_power, "2024-01-01 00:00:00,-3.0").unwrap();
    assert!(DataLoader::observations_from_csv(no_power.path()).is_err());

    let mut bad_time = NamedTempFile::new().unwrap();
    writeln!(bad_time, "datetime,power_true,temperature").unwrap();
    writeln!(bad_time, "soon,900.0,-3.0").unwrap();
    assert!(DataLoader::observations_from_csv(bad_time.path()).is_err());
}

#[test]
fn test_frame_export() {
    let observations = vec![
        HourlyObservation::new(at(2024, 1, 1, 23), 950.0, -2.0),
        HourlyObservation::new(at(2024, 1, 2, 1), 940.0, -2.5),
    ];
    let calendar = vec![CalendarFlag { date: day(2024, 1, 1), is_day_off: true }];
    let frame = HourlyFrame::assemble(at(2024, 1, 1, 23), at(2024, 1, 2, 1), &observations, &calendar)
        .unwrap();

    assert_eq!(frame.observed_power_until(&at(2024, 1, 2, 0)), vec![950.0]);
    assert_eq!(frame.observed_power_until(&at(2024, 1, 2, 1)), vec![950.0, 940.0]);

    let df = frame.to_dataframe().unwrap();
    assert_eq!(df.shape(), (3, 4));
    assert_eq!(df.column("power_true").unwrap().null_count(), 1);
    // only January 1st has a calendar entry
    assert_eq!(df.column("day_off").unwrap().null_count(), 2);

    // the exported frame loads back into the same observations
    let reloaded = DataLoader::observations_from_dataframe(&df).unwrap();
    assert_eq!(reloaded[0], observations[0]);
    assert_eq!(reloaded[1], HourlyObservation::empty(at(2024, 1, 2, 0)));
}

#[test]
fn test_month_and_resolution_helpers() {
    let (first, last) = month_hours(day(2023, 12, 31)).unwrap();
    assert_eq!(first, at(2023, 12, 1, 0));
    assert_eq!(last, at(2023, 12, 31, 23));
    assert_eq!(Resolution::Hourly.step(), chrono::Duration::hours(1));
}
