//! Bringing the persisted consumption series up to date

use crate::data::{floor_hour, DataLoader, Resolution, SeriesColumn};
use crate::error::{ForecastError, Result};
use crate::repair::{repair, RepairSettings};
use crate::store::SqliteStore;
use crate::telemetry::TelemetrySource;
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use tracing::{info, warn};

/// Freshness of the persisted series relative to the cutoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No true power stored at all
    Empty,
    Stale {
        last: NaiveDateTime,
        cutoff: NaiveDateTime,
    },
    Current {
        last: NaiveDateTime,
    },
}

/// Result of one update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Current,
    NoHistory,
    Updated {
        rows: usize,
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    /// Telemetry could not be used; the store was not touched
    Unavailable { reason: String },
}

#[derive(Debug, Clone)]
pub struct IngestionUpdater {
    power: RepairSettings,
    temperature: RepairSettings,
    cutoff_hour: u32,
}

impl IngestionUpdater {
    pub fn new(power: RepairSettings, temperature: RepairSettings, cutoff_hour: u32) -> Self {
        Self {
            power,
            temperature,
            cutoff_hour,
        }
    }

    /// Latest hour the series is expected to reach: today at the cutoff hour
    /// once that hour has started, yesterday at the cutoff hour before it
    pub fn cutoff(&self, now: NaiveDateTime) -> Result<NaiveDateTime> {
        let time = NaiveTime::from_hms_opt(self.cutoff_hour, 0, 0).ok_or_else(|| {
            ForecastError::ValidationError(format!("Invalid cutoff hour {}", self.cutoff_hour))
        })?;
        let day = if now.hour() >= self.cutoff_hour {
            now.date()
        } else {
            now.date() - Duration::days(1)
        };
        Ok(day.and_time(time))
    }

    pub fn state(&self, store: &SqliteStore, now: NaiveDateTime) -> Result<IngestState> {
        let cutoff = self.cutoff(now)?;
        Ok(match store.latest_observed_power()? {
            None => IngestState::Empty,
            Some(last) if last < cutoff => IngestState::Stale { last, cutoff },
            Some(last) => IngestState::Current { last },
        })
    }

    /// Pull telemetry from the last stored hour to the cutoff, repair it and
    /// fill the store's empty cells
    pub fn update(
        &self,
        store: &SqliteStore,
        source: &dyn TelemetrySource,
        now: NaiveDateTime,
    ) -> Result<IngestOutcome> {
        let (last, cutoff) = match self.state(store, now)? {
            IngestState::Empty => {
                warn!(component = "ingest", event = "ingest.no_history");
                return Ok(IngestOutcome::NoHistory);
            }
            IngestState::Current { last } => {
                info!(component = "ingest", event = "ingest.current", %last);
                return Ok(IngestOutcome::Current);
            }
            IngestState::Stale { last, cutoff } => (floor_hour(last), cutoff),
        };

        // the last stored hour is fetched again as context for the repair
        let frame = match source.fetch(last, cutoff, Resolution::Hourly) {
            Ok(frame) if frame.height() > 0 => frame,
            Ok(_) => return Ok(unavailable(format!("no telemetry for {}..{}", last, cutoff))),
            Err(err) => return Ok(unavailable(err.to_string())),
        };

        let mut observations = match DataLoader::observations_from_dataframe(&frame) {
            Ok(observations) => observations,
            Err(err) => return Ok(unavailable(format!("unreadable telemetry: {}", err))),
        };
        let fixed_power = repair(
            &mut observations,
            SeriesColumn::Power,
            &self.power,
            Resolution::Hourly,
        );
        let fixed_temperature = repair(
            &mut observations,
            SeriesColumn::Temperature,
            &self.temperature,
            Resolution::Hourly,
        );
        observations.retain(|o| o.timestamp > last);
        if observations.is_empty() {
            return Ok(unavailable(format!("no telemetry after {}", last)));
        }

        let rows = store.fill_missing_observations(&observations)?;
        let from = last + Duration::hours(1);
        info!(
            component = "ingest",
            event = "ingest.updated",
            %from,
            to = %cutoff,
            rows,
            fixed_power,
            fixed_temperature
        );
        Ok(IngestOutcome::Updated {
            rows,
            from,
            to: cutoff,
        })
    }
}

fn unavailable(reason: String) -> IngestOutcome {
    warn!(component = "ingest", event = "ingest.unavailable", %reason);
    IngestOutcome::Unavailable { reason }
}
