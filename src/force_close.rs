//! End-of-day flattening

use chrono::NaiveTime;

use crate::gateway::PositionSnapshot;
use crate::position::Position;
use crate::session::TradingDay;
use crate::OrderIntent;

/// Flattens any open position at or after a fixed wall-clock time, once per day
#[derive(Debug, Clone, Copy)]
pub struct ForceCloseGuard {
    force_close: NaiveTime,
}

impl ForceCloseGuard {
    pub fn new(force_close: NaiveTime) -> Self {
        Self { force_close }
    }

    pub fn time(&self) -> NaiveTime {
        self.force_close
    }

    pub fn is_due(&self, time: NaiveTime) -> bool {
        time >= self.force_close
    }

    /// Exit intent for the whole position, or `None` when there is nothing to do.
    ///
    /// The gateway's holding wins over the local view, so a position carried
    /// past a day reset is still flattened.
    pub fn check(
        &self,
        time: NaiveTime,
        position: &Position,
        gateway: &PositionSnapshot,
        day: &TradingDay,
    ) -> Option<OrderIntent> {
        if !self.is_due(time) || day.force_closed_today {
            return None;
        }
        if !gateway.is_flat() {
            return Some(OrderIntent::ExitAll {
                direction: gateway.direction,
                quantity: gateway.size,
            });
        }
        if position.is_flat() {
            return None;
        }
        Some(OrderIntent::ExitAll {
            direction: position.direction,
            quantity: position.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn long(size: u32) -> Position {
        Position {
            direction: Direction::Long,
            size,
            average_entry_price: Some(100.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_fires_at_and_after_cutoff() {
        let guard = ForceCloseGuard::new(t(15, 55));
        let day = TradingDay::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

        let flat = PositionSnapshot::flat();

        assert!(guard.check(t(15, 54), &long(2), &flat, &day).is_none());
        assert_eq!(
            guard.check(t(15, 55), &long(2), &flat, &day),
            Some(OrderIntent::ExitAll {
                direction: Direction::Long,
                quantity: 2
            })
        );
        assert!(guard.check(t(16, 10), &long(1), &flat, &day).is_some());
    }

    #[test]
    fn test_flat_or_already_fired_is_noop() {
        let guard = ForceCloseGuard::new(t(15, 55));
        let mut day = TradingDay::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let flat = PositionSnapshot::flat();
        assert!(guard.check(t(16, 0), &Position::default(), &flat, &day).is_none());

        day.force_closed_today = true;
        assert!(guard.check(t(16, 0), &long(1), &flat, &day).is_none());
    }

    #[test]
    fn test_gateway_position_flattened_when_local_is_flat() {
        let guard = ForceCloseGuard::new(t(15, 55));
        let day = TradingDay::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        let carried = PositionSnapshot {
            direction: Direction::Short,
            size: 3,
            average_price: Some(5000.0),
        };

        assert!(guard.check(t(15, 0), &Position::default(), &carried, &day).is_none());
        assert_eq!(
            guard.check(t(15, 55), &Position::default(), &carried, &day),
            Some(OrderIntent::ExitAll {
                direction: Direction::Short,
                quantity: 3
            })
        );
        // gateway size wins over a stale local size
        let partial = PositionSnapshot {
            direction: Direction::Long,
            size: 1,
            average_price: None,
        };
        assert_eq!(
            guard.check(t(15, 55), &long(2), &partial, &day),
            Some(OrderIntent::ExitAll {
                direction: Direction::Long,
                quantity: 1
            })
        );
    }
}
