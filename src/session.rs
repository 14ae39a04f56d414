//! Per-trading-day state
//!
//! [`SessionDayContext`] is the only place that compares calendar dates. On a
//! date change the whole [`TradingDay`] is replaced, so no day-scoped field can
//! survive a rollover by accident.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::opening_range::{OpeningRange, ReferenceLevel};

/// Weekday switches indexed Monday = 0 .. Sunday = 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayTable([bool; 7]);

impl WeekdayTable {
    pub fn new(days: [bool; 7]) -> Self {
        Self(days)
    }

    pub fn all() -> Self {
        Self([true; 7])
    }

    pub fn is_enabled(&self, weekday: Weekday) -> bool {
        self.0[weekday.num_days_from_monday() as usize]
    }

    pub fn set(&mut self, weekday: Weekday, enabled: bool) {
        self.0[weekday.num_days_from_monday() as usize] = enabled;
    }
}

/// Everything that lives for exactly one trading day
#[derive(Debug, Clone, PartialEq)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub opening_range: OpeningRange,
    pub reference_level: ReferenceLevel,
    pub entry_taken_today: bool,
    pub force_closed_today: bool,
    /// Annotation keys already emitted today
    pub drawn: HashSet<String>,
}

impl TradingDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            opening_range: OpeningRange::default(),
            reference_level: ReferenceLevel::default(),
            entry_taken_today: false,
            force_closed_today: false,
            drawn: HashSet::new(),
        }
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    /// Record that an annotation key was emitted; false if it already was today
    pub fn mark_drawn(&mut self, key: &str) -> bool {
        if self.drawn.contains(key) {
            false
        } else {
            self.drawn.insert(key.to_string());
            true
        }
    }

    /// `yyyyMMdd` stamp used in annotation keys
    pub fn stamp(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

/// Holder of the single live [`TradingDay`]
#[derive(Debug, Default)]
pub struct SessionDayContext {
    day: Option<TradingDay>,
    days_seen: usize,
}

impl SessionDayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `date`, replacing the trading day when it changes.
    ///
    /// Returns `true` when a new day started; the caller must then reset its
    /// position state as well.
    pub fn roll(&mut self, date: NaiveDate) -> bool {
        match &self.day {
            Some(day) if day.date == date => false,
            _ => {
                self.day = Some(TradingDay::new(date));
                self.days_seen += 1;
                true
            }
        }
    }

    pub fn current(&self) -> Option<&TradingDay> {
        self.day.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut TradingDay> {
        self.day.as_mut()
    }

    pub fn days_seen(&self) -> usize {
        self.days_seen
    }
}
