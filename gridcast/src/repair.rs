//! Short-lived spike removal for raw telemetry series
//!
//! A jump larger than `min_jump` between two neighbours opens or closes an
//! anomaly. When two consecutive jumps are at most `max_gap` steps apart the
//! values between them are dropped and forward-filled from the last good
//! reading. A lone jump is a genuine level shift and is left alone, as is a
//! jump at the very end of the series with no partner after it.

use crate::data::{HourlyObservation, Resolution, SeriesColumn};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Thresholds for one repaired column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepairSettings {
    /// Minimum absolute difference of neighbours that counts as a jump
    pub min_jump: f64,
    /// Longest anomaly, in resolution steps, that is still repaired
    pub max_gap: i64,
}

impl RepairSettings {
    pub fn new(min_jump: f64, max_gap: i64) -> Self {
        Self { min_jump, max_gap }
    }
}

/// Timestamps where the column jumps by more than `min_jump` from the
/// previous row; gaps never count as jumps
pub fn anomaly_boundaries(
    series: &[HourlyObservation],
    column: SeriesColumn,
    min_jump: f64,
) -> Vec<NaiveDateTime> {
    series
        .windows(2)
        .filter_map(|pair| {
            let prev = column.get(&pair[0])?;
            let next = column.get(&pair[1])?;
            ((next - prev).abs() > min_jump).then_some(pair[1].timestamp)
        })
        .collect()
}

/// Remove short spikes from `column` in place and forward-fill the holes.
///
/// `series` must be sorted by timestamp. Returns the number of values that
/// were invalidated.
pub fn repair(
    series: &mut [HourlyObservation],
    column: SeriesColumn,
    settings: &RepairSettings,
    frequency: Resolution,
) -> usize {
    let boundaries = anomaly_boundaries(series, column, settings.min_jump);
    let step = frequency.step();

    let mut invalid: HashSet<NaiveDateTime> = HashSet::new();
    for pair in boundaries.windows(2) {
        let (open, close) = (pair[0], pair[1]);
        let steps = (close - open).num_seconds() / step.num_seconds();
        if steps > settings.max_gap {
            continue;
        }
        let mut ts = open;
        while ts < close {
            invalid.insert(ts);
            ts += step;
        }
    }

    let mut invalidated = 0;
    let mut last_good: Option<f64> = None;
    for obs in series.iter_mut() {
        if invalid.contains(&obs.timestamp) && column.get(obs).is_some() {
            column.set(obs, None);
            invalidated += 1;
        }
        match column.get(obs) {
            Some(value) => last_good = Some(value),
            None => column.set(obs, last_good),
        }
    }

    if invalidated > 0 {
        debug!(
            component = "repair",
            column = column.name(),
            invalidated,
            "replaced anomalous values with last good reading"
        );
    }
    invalidated
}
