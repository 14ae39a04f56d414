//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Range monotonicity: the opening range only widens, then freezes
//! 2. Single daily entry: at most one open intent per trading day
//! 3. Stop monotonicity: a protective stop never moves away from price
//! 4. Add-on idempotence: at most one scaling add per position
//! 5. Force-close precedence: a due force close is the only intent on its bar
//! 6. Reset completeness: a new day and a reset position start from defaults

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use proptest::prelude::*;

use orb_breakout::config::{StrategyConfig, TimeOfDayInput};
use orb_breakout::entry::EntrySignal;
use orb_breakout::gateway::{DryRunGateway, ExecutionGateway};
use orb_breakout::opening_range::{OpeningRange, OpeningRangeBuilder, RangeUpdate};
use orb_breakout::position::{Position, PositionManager, Stage};
use orb_breakout::session::{SessionDayContext, TradingDay};
use orb_breakout::time_window::TimeWindow;
use orb_breakout::{
    Bar, BarEvent, Direction, IndicatorSnapshot, OrbEngine, OrderIntent, StrategyParams,
    TradeDirection,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn at(date: NaiveDate, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(minute / 60, minute % 60, 0).unwrap()
}

fn day(offset: u32) -> NaiveDate {
    // 2024-03-04 is a Monday; only weekday offsets are used
    NaiveDate::from_ymd_opt(2024, 3, 4 + offset).unwrap()
}

fn bar(dt: NaiveDateTime, prev: f64, close: f64) -> Bar {
    Bar::new_unchecked(dt, prev, prev.max(close) + 0.25, prev.min(close) - 0.25, close, 100.0)
}

/// One event per minute with the auxiliary bar equal to the primary bar
fn events(date: NaiveDate, start_minute: u32, closes: &[f64]) -> Vec<BarEvent> {
    let mut prev = closes.first().copied().unwrap_or(5000.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let b = bar(at(date, start_minute + i as u32), prev, close);
            prev = close;
            BarEvent {
                primary: b.clone(),
                auxiliary: b,
                indicators: IndicatorSnapshot {
                    atr: Some(4.0),
                    volume: 100.0,
                    volume_sma: Some(100.0),
                },
            }
        })
        .collect()
}

fn open_config() -> StrategyConfig {
    StrategyConfig {
        trade_direction: TradeDirection::Both,
        or_start: TimeOfDayInput::text("09:30"),
        or_end: TimeOfDayInput::text("09:45"),
        min_range_size: 0.0,
        enable_reference_filter: false,
        ..Default::default()
    }
}

fn engine(cfg: StrategyConfig) -> OrbEngine<DryRunGateway, ()> {
    let mut params = StrategyParams::try_from(&cfg).unwrap();
    params.bars_required = 1;
    OrbEngine::new(params, DryRunGateway::new(), ())
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (4950.0..5050.0_f64).prop_map(|p| (p * 4.0).round() / 4.0)
}

fn arb_path(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-6.0..6.0_f64, len).prop_map(|steps| {
        let mut price = 5000.0;
        steps
            .into_iter()
            .map(|s| {
                price += (s * 4.0).round() / 4.0;
                price
            })
            .collect()
    })
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

// ── 1. Range Monotonicity ────────────────────────────────────────────

proptest! {
    #[test]
    fn range_only_widens_then_freezes(
        highs in prop::collection::vec(arb_price(), 1..20),
        after in prop::collection::vec(arb_price(), 1..10),
    ) {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let builder = OpeningRangeBuilder::new(window);
        let mut range = OpeningRange::default();
        let mut last: Option<(f64, f64)> = None;

        for (i, &h) in highs.iter().enumerate() {
            let b = Bar::new_unchecked(at(day(0), 9 * 60 + 30 + i as u32), h - 1.0, h, h - 3.0, h - 1.0, 1.0);
            prop_assert_eq!(builder.update(&mut range, &b, true), RangeUpdate::Sampled);
            let (high, low) = range.bounds().unwrap();
            if let Some((prev_high, prev_low)) = last {
                prop_assert!(high >= prev_high);
                prop_assert!(low <= prev_low);
            }
            last = Some((high, low));
        }

        let frozen = range.bounds();
        for (i, &h) in after.iter().enumerate() {
            let b = Bar::new_unchecked(at(day(0), 11 * 60 + i as u32), h, h + 50.0, h - 50.0, h, 1.0);
            builder.update(&mut range, &b, true);
            prop_assert_eq!(range.bounds(), frozen);
            prop_assert!(range.is_final());
        }
    }
}

// ── 2. Single Daily Entry ────────────────────────────────────────────

proptest! {
    #[test]
    fn at_most_one_entry_per_day(
        day_one in arb_path(90),
        day_two in arb_path(90),
        flatten_every in 3usize..15,
    ) {
        let mut engine = engine(open_config());
        let mut all = events(day(0), 9 * 60 + 30, &day_one);
        all.extend(events(day(1), 9 * 60 + 30, &day_two));

        let mut entries_by_day = std::collections::HashMap::<NaiveDate, usize>::new();
        for (i, e) in all.iter().enumerate() {
            // external exits keep freeing the position up
            if i % flatten_every == 0 {
                engine.gateway_mut().flatten();
            }
            for intent in engine.on_bar(e) {
                if intent.is_entry() {
                    *entries_by_day.entry(e.primary.datetime.date()).or_insert(0) += 1;
                }
            }
        }
        for count in entries_by_day.values() {
            prop_assert!(*count <= 1);
        }
    }
}

// ── 3/4. Stop Monotonicity and Add-on Idempotence ─────────────────────

proptest! {
    #[test]
    fn stop_never_loosens_and_adds_once(
        direction in arb_direction(),
        path in arb_path(120),
        atr in 1.0..8.0_f64,
    ) {
        let cfg = StrategyConfig {
            contracts: 2,
            enable_breakeven: true,
            enable_add_on: true,
            add_threshold_points: 5.0,
            partial_threshold_points: 10.0,
            enable_trailing: true,
            trail_activation_points: 6.0,
            trail_buffer_points: 2.0,
            ..Default::default()
        };
        let mut pm = PositionManager::new(&StrategyParams::try_from(&cfg).unwrap());
        pm.open(&EntrySignal {
            direction,
            entry_price: 5000.0,
            stop: direction.offset(5000.0, -atr),
            target: direction.offset(5000.0, atr * 3.5),
            quantity: 2,
            atr,
        });

        let mut stop = pm.position().protective_stop.unwrap();
        let mut adds = 0;
        for &close in &path {
            for intent in pm.manage(close, Some(atr)) {
                if matches!(intent, OrderIntent::AddLong { .. } | OrderIntent::AddShort { .. }) {
                    adds += 1;
                }
                if let OrderIntent::SetStop { price, .. } = intent {
                    // pushed stops never undercut the latched one
                    prop_assert!(direction.points_gained(stop, price) >= 0.0);
                }
            }
            if pm.is_flat() {
                break;
            }
            let current = pm.position().protective_stop.unwrap();
            prop_assert!(direction.points_gained(stop, current) >= 0.0, "stop loosened {} -> {}", stop, current);
            stop = current;
        }
        prop_assert!(adds <= 1);
        if adds == 1 {
            prop_assert!(pm.position().is_flat() || pm.position().stages.contains(Stage::Added));
        }
    }
}

// ── 5. Force-Close Precedence ────────────────────────────────────────

proptest! {
    #[test]
    fn force_close_is_alone_on_its_bar(
        path in arb_path(40),
        minutes_late in 0u32..5,
    ) {
        let mut cfg = open_config();
        cfg.force_close = TimeOfDayInput::text("10:00");
        cfg.enable_add_on = true;
        cfg.enable_trailing = true;
        let mut engine = engine(cfg);

        // 09:30-09:45 builds a range around 5000; 09:46 breaks well above it
        let mut closes = vec![5000.0, 5004.0, 4996.0];
        closes.extend(std::iter::repeat(5000.0).take(13));
        closes.push(5030.0);
        closes.extend(path.iter().map(|p| p + 30.0));
        for e in events(day(0), 9 * 60 + 30, &closes) {
            if e.primary.datetime.time() >= NaiveTime::from_hms_opt(10, minutes_late, 0).unwrap() {
                break;
            }
            engine.on_bar(&e);
        }
        prop_assume!(!engine.position().is_flat());

        let late = events(day(0), 10 * 60 + minutes_late, &[5040.0, 5041.0]);
        let size = engine.position().size;
        let out = engine.on_bar(&late[0]);
        prop_assert_eq!(out, vec![OrderIntent::ExitAll { direction: Direction::Long, quantity: size }]);
        prop_assert!(engine.day().unwrap().force_closed_today);
        prop_assert!(engine.on_bar(&late[1]).is_empty());
        prop_assert!(engine.gateway().position().is_flat());
    }
}

// ── 6. Reset Completeness ────────────────────────────────────────────

proptest! {
    #[test]
    fn new_day_and_reset_start_clean(
        direction in arb_direction(),
        path in arb_path(30),
        entry_taken in any::<bool>(),
        force_closed in any::<bool>(),
        reference in arb_price(),
    ) {
        let mut ctx = SessionDayContext::new();
        ctx.roll(day(0));
        {
            let today = ctx.current_mut().unwrap();
            today.entry_taken_today = entry_taken;
            today.force_closed_today = force_closed;
            today.reference_level = orb_breakout::opening_range::ReferenceLevel::captured(reference);
            today.mark_drawn("ORB_Box_20240304");
        }
        prop_assert!(ctx.roll(day(1)));
        prop_assert_eq!(ctx.current().unwrap(), &TradingDay::new(day(1)));

        let mut cfg = StrategyConfig::default();
        cfg.enable_add_on = true;
        cfg.enable_trailing = true;
        let mut pm = PositionManager::new(&StrategyParams::try_from(&cfg).unwrap());
        pm.open(&EntrySignal {
            direction,
            entry_price: 5000.0,
            stop: direction.offset(5000.0, -4.0),
            target: direction.offset(5000.0, 14.0),
            quantity: 1,
            atr: 4.0,
        });
        for &close in &path {
            pm.manage(close, Some(4.0));
        }
        pm.reset();
        prop_assert_eq!(pm.position(), &Position::default());
        prop_assert!(pm.position().stages.is_empty());
    }
}
