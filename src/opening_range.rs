//! Opening range construction and reference-level capture

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time_window::TimeWindow;
use crate::Bar;

/// High/low band formed during the opening-range window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    bounds: Option<(f64, f64)>,
    pub window_start: Option<NaiveDateTime>,
    pub window_end: Option<NaiveDateTime>,
    finalized: bool,
}

impl OpeningRange {
    pub fn high(&self) -> Option<f64> {
        self.bounds.map(|(high, _)| high)
    }

    pub fn low(&self) -> Option<f64> {
        self.bounds.map(|(_, low)| low)
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    pub fn size(&self) -> Option<f64> {
        self.bounds.map(|(high, low)| high - low)
    }

    pub fn is_set(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn is_final(&self) -> bool {
        self.finalized
    }

    fn sample(&mut self, bar: &Bar) {
        self.bounds = Some(match self.bounds {
            None => (bar.high, bar.low),
            Some((high, low)) => (high.max(bar.high), low.min(bar.low)),
        });
        if self.window_start.is_none() {
            self.window_start = Some(bar.datetime);
        }
        self.window_end = Some(bar.datetime);
    }
}

/// Outcome of feeding one auxiliary bar to the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUpdate {
    /// Bar was inside the window and widened (or seeded) the range
    Sampled,
    /// First bar after the window closed; range is now immutable
    Finalized,
    /// Nothing changed
    Unchanged,
}

/// Accumulates the opening range from auxiliary bars
#[derive(Debug, Clone, Copy)]
pub struct OpeningRangeBuilder {
    window: TimeWindow,
}

impl OpeningRangeBuilder {
    pub fn new(window: TimeWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn update(
        &self,
        range: &mut OpeningRange,
        aux_bar: &Bar,
        trading_day_enabled: bool,
    ) -> RangeUpdate {
        if range.finalized || !trading_day_enabled {
            return RangeUpdate::Unchanged;
        }

        if self.window.contains_datetime(&aux_bar.datetime) {
            range.sample(aux_bar);
            debug!(
                high = range.high(),
                low = range.low(),
                at = %aux_bar.datetime,
                "Opening range sampled"
            );
            RangeUpdate::Sampled
        } else if range.is_set() {
            range.finalized = true;
            debug!(
                high = range.high(),
                low = range.low(),
                "Opening range finalized"
            );
            RangeUpdate::Finalized
        } else {
            RangeUpdate::Unchanged
        }
    }
}

/// Anchor price captured once per day (the midnight open by default)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLevel {
    price: Option<f64>,
    pub captured_at: Option<NaiveDateTime>,
}

impl ReferenceLevel {
    pub fn captured(price: f64) -> Self {
        Self {
            price: Some(price),
            captured_at: None,
        }
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn is_set(&self) -> bool {
        self.price.is_some()
    }

    /// Capture the open of the first auxiliary bar inside `window`.
    ///
    /// Returns the captured price only on the bar that captured it.
    pub fn try_capture(
        &mut self,
        window: &TimeWindow,
        aux_bar: &Bar,
        trading_day_enabled: bool,
    ) -> Option<f64> {
        if self.is_set() || !trading_day_enabled || !window.contains_datetime(&aux_bar.datetime) {
            return None;
        }
        self.price = Some(aux_bar.open);
        self.captured_at = Some(aux_bar.datetime);
        debug!(price = aux_bar.open, at = %aux_bar.datetime, "Reference level captured");
        self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn bar(h: u32, m: u32, high: f64, low: f64) -> Bar {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        Bar::new_unchecked(dt, low, high, low, low, 100.0)
    }

    fn builder() -> OpeningRangeBuilder {
        OpeningRangeBuilder::new(TimeWindow::new(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 45, 0).unwrap(),
        ))
    }

    #[test]
    fn test_range_tracks_extremes() {
        let b = builder();
        let mut range = OpeningRange::default();
        assert_eq!(b.update(&mut range, &bar(9, 30, 5000.0, 4995.0), true), RangeUpdate::Sampled);
        b.update(&mut range, &bar(9, 35, 5012.0, 4998.0), true);
        b.update(&mut range, &bar(9, 40, 5008.0, 4990.0), true);

        assert_eq!(range.bounds(), Some((5012.0, 4990.0)));
        assert_eq!(range.size(), Some(22.0));
        assert_eq!(range.window_start.unwrap().time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(range.window_end.unwrap().time(), NaiveTime::from_hms_opt(9, 40, 0).unwrap());
        assert!(!range.is_final());
    }

    #[test]
    fn test_range_freezes_after_window() {
        let b = builder();
        let mut range = OpeningRange::default();
        b.update(&mut range, &bar(9, 45, 5000.0, 4990.0), true);
        assert_eq!(b.update(&mut range, &bar(9, 50, 5100.0, 4900.0), true), RangeUpdate::Finalized);
        assert_eq!(b.update(&mut range, &bar(9, 55, 5200.0, 4800.0), true), RangeUpdate::Unchanged);
        assert_eq!(range.bounds(), Some((5000.0, 4990.0)));
        assert!(range.is_final());
    }

    #[test]
    fn test_disabled_day_builds_nothing() {
        let b = builder();
        let mut range = OpeningRange::default();
        assert_eq!(b.update(&mut range, &bar(9, 35, 5000.0, 4990.0), false), RangeUpdate::Unchanged);
        assert!(!range.is_set());
    }

    #[test]
    fn test_bars_before_window_leave_range_unset() {
        let b = builder();
        let mut range = OpeningRange::default();
        assert_eq!(b.update(&mut range, &bar(9, 25, 5000.0, 4990.0), true), RangeUpdate::Unchanged);
        assert!(!range.is_set());
        assert!(!range.is_final());
    }

    #[test]
    fn test_zero_priced_range_is_still_set() {
        let b = builder();
        let mut range = OpeningRange::default();
        b.update(&mut range, &bar(9, 35, 0.0, -0.5), true);
        assert_eq!(range.high(), Some(0.0));
        assert!(range.is_set());
    }

    #[test]
    fn test_reference_captured_once() {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(1, 1, 0).unwrap(),
        );
        let mut level = ReferenceLevel::default();
        assert_eq!(level.try_capture(&window, &bar(0, 55, 10.0, 9.0), true), None);

        let first = bar(1, 0, 4981.0, 4975.0);
        assert_eq!(level.try_capture(&window, &first, true), Some(first.open));
        assert_eq!(level.try_capture(&window, &bar(1, 1, 4990.0, 4985.0), true), None);
        assert_eq!(level.price(), Some(4975.0));
    }
}
