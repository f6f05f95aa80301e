//! Cyclical calendar encodings
//!
//! Calendar components wrap around (hour 23 is next to hour 0), so they are
//! projected onto the unit circle as a sine/cosine pair instead of being fed
//! to models as raw integers.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// A periodic calendar component of an hourly timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclicalComponent {
    /// Hour of day, 0..=23
    Hour,
    /// Ordinal day of year, 1..=366
    DayOfYear,
    /// Month, 1..=12
    Month,
    /// Day of week, Monday = 0
    Weekday,
}

impl CyclicalComponent {
    /// All components in their canonical feature order
    pub const ALL: [CyclicalComponent; 4] = [
        CyclicalComponent::Hour,
        CyclicalComponent::DayOfYear,
        CyclicalComponent::Month,
        CyclicalComponent::Weekday,
    ];

    /// Length of one full cycle in component units
    pub fn period(self) -> f64 {
        match self {
            CyclicalComponent::Hour => 24.0,
            CyclicalComponent::DayOfYear => 365.25,
            CyclicalComponent::Month => 12.0,
            CyclicalComponent::Weekday => 7.0,
        }
    }

    /// Raw component value of a timestamp
    pub fn value(self, timestamp: &NaiveDateTime) -> f64 {
        match self {
            CyclicalComponent::Hour => timestamp.hour() as f64,
            CyclicalComponent::DayOfYear => timestamp.ordinal() as f64,
            CyclicalComponent::Month => timestamp.month() as f64,
            CyclicalComponent::Weekday => timestamp.weekday().num_days_from_monday() as f64,
        }
    }

    /// Encode a timestamp as `(sin, cos)` of `2π · value / period`
    pub fn encode(self, timestamp: &NaiveDateTime) -> (f64, f64) {
        let angle = 2.0 * PI * self.value(timestamp) / self.period();
        (angle.sin(), angle.cos())
    }

    /// Short name used in feature column names
    pub fn name(self) -> &'static str {
        match self {
            CyclicalComponent::Hour => "hour",
            CyclicalComponent::DayOfYear => "day_of_year",
            CyclicalComponent::Month => "month",
            CyclicalComponent::Weekday => "weekday",
        }
    }
}

impl fmt::Display for CyclicalComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
