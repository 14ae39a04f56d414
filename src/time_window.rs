//! Time-of-day windows
//!
//! Session, opening-range and reference windows are configured as wall-clock
//! times. A window whose start is after its end wraps past midnight.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Inclusive time-of-day window, possibly wrapping past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        is_time_between(self.start, self.end, t)
    }

    pub fn contains_datetime(&self, dt: &NaiveDateTime) -> bool {
        self.contains(dt.time())
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }
}

/// `[start, end]` membership; `start > end` means the window crosses midnight
pub fn is_time_between(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start <= end {
        t >= start && t <= end
    } else {
        t >= start || t <= end
    }
}

/// Parse a configured time of day.
///
/// Accepts `HH:mm`, `H:mm`, `HH:mm:ss`, or the integer encoding `HHmm`
/// (`930` is 09:30).
pub fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = value.trim();
    let invalid = || ConfigError::InvalidTime {
        field: field.to_string(),
        value: value.to_string(),
    };

    for fmt in ["%H:%M", "%H:%M:%S"] {
        if let Ok(t) = NaiveTime::parse_from_str(trimmed, fmt) {
            return Ok(t);
        }
    }

    if !trimmed.is_empty() && trimmed.len() <= 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let encoded: u32 = trimmed.parse().map_err(|_| invalid())?;
        return decode_hhmm(encoded).ok_or_else(invalid);
    }

    Err(invalid())
}

/// Decode `HHmm` integer encoding
pub fn decode_hhmm(encoded: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(encoded / 100, encoded % 100, 0)
}

/// Render a time as `HH:mm` (seconds shown only when non-zero)
pub fn format_time(t: NaiveTime) -> String {
    if t.second() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}
