//! Per-bar orchestration
//!
//! [`OrbEngine`] consumes one synchronized [`BarEvent`] at a time and runs the
//! fixed pipeline:
//!
//! 1. warm-up gate
//! 2. day rollover
//! 3. gateway reconciliation
//! 4. force close (pre-empts everything else on the bar)
//! 5. opening range and reference capture
//! 6. confirmation filters and entry
//! 7. position management
//!
//! Gateway failures are logged and absorbed; `on_bar` never fails.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::annotations::{Annotation, AnnotationSink};
use crate::config::StrategyParams;
use crate::entry::{EntryContext, EntrySignal, EntrySignalEvaluator};
use crate::filters::ConfirmationFilterSet;
use crate::force_close::ForceCloseGuard;
use crate::gateway::ExecutionGateway;
use crate::opening_range::{OpeningRangeBuilder, RangeUpdate};
use crate::position::{Position, PositionManager, Reconciliation};
use crate::session::{SessionDayContext, TradingDay};
use crate::{BarEvent, OrderIntent};

/// Running counters for a replay or live session
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub bars_seen: usize,
    pub bars_evaluated: usize,
    pub entries: usize,
    pub force_closes: usize,
    pub rejections: usize,
    pub intents_by_kind: BTreeMap<&'static str, usize>,
}

pub struct OrbEngine<G: ExecutionGateway, A: AnnotationSink> {
    params: StrategyParams,
    range_builder: OpeningRangeBuilder,
    filters: ConfirmationFilterSet,
    evaluator: EntrySignalEvaluator,
    force_close: ForceCloseGuard,
    positions: PositionManager,
    session: SessionDayContext,
    gateway: G,
    sink: A,
    primary_bars: usize,
    auxiliary_bars: usize,
    last_auxiliary: Option<NaiveDateTime>,
    stats: EngineStats,
}

impl<G: ExecutionGateway, A: AnnotationSink> OrbEngine<G, A> {
    pub fn new(params: StrategyParams, gateway: G, sink: A) -> Self {
        Self {
            range_builder: OpeningRangeBuilder::new(params.opening_range),
            filters: ConfirmationFilterSet::new(&params),
            evaluator: EntrySignalEvaluator::new(&params),
            force_close: ForceCloseGuard::new(params.force_close),
            positions: PositionManager::new(&params),
            session: SessionDayContext::new(),
            params,
            gateway,
            sink,
            primary_bars: 0,
            auxiliary_bars: 0,
            last_auxiliary: None,
            stats: EngineStats::default(),
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn position(&self) -> &Position {
        self.positions.position()
    }

    pub fn day(&self) -> Option<&TradingDay> {
        self.session.current()
    }

    pub fn days_seen(&self) -> usize {
        self.session.days_seen()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn into_parts(self) -> (G, A, EngineStats) {
        (self.gateway, self.sink, self.stats)
    }

    fn warmed_up(&mut self, event: &BarEvent) -> bool {
        self.primary_bars += 1;
        if self.last_auxiliary != Some(event.auxiliary.datetime) {
            self.last_auxiliary = Some(event.auxiliary.datetime);
            self.auxiliary_bars += 1;
        }
        self.primary_bars >= self.params.bars_required
            && self.auxiliary_bars >= self.params.bars_required
    }

    /// Process one primary bar and return every intent emitted for it
    pub fn on_bar(&mut self, event: &BarEvent) -> Vec<OrderIntent> {
        self.stats.bars_seen += 1;
        self.gateway.on_bar(&event.primary);

        if !self.warmed_up(event) {
            return Vec::new();
        }
        self.stats.bars_evaluated += 1;

        let primary = &event.primary;
        let auxiliary = &event.auxiliary;

        // ===== day rollover =====
        if self.session.roll(primary.datetime.date()) {
            if !self.positions.is_flat() {
                warn!(
                    direction = %self.positions.position().direction,
                    size = self.positions.position().size,
                    "Position carried into a new day; local state reset"
                );
            }
            self.positions.reset();
            debug!(date = %primary.datetime.date(), "New trading day");
        }
        let Some(day) = self.session.current_mut() else {
            return Vec::new();
        };

        // ===== reconciliation =====
        let snapshot = self.gateway.position();
        match self.positions.reconcile(&snapshot) {
            Reconciliation::Untracked => warn!(
                direction = %snapshot.direction,
                size = snapshot.size,
                "Gateway holds a position the engine is not tracking"
            ),
            Reconciliation::Closed => debug!(at = %primary.datetime, "Position flat after gateway update"),
            Reconciliation::Synced | Reconciliation::Unchanged => {}
        }

        // ===== force close =====
        if let Some(exit) =
            self.force_close
                .check(primary.datetime.time(), self.positions.position(), &snapshot, day)
        {
            if submit(&mut self.gateway, &mut self.stats, &exit) {
                // local state clears once the gateway reports flat
                day.force_closed_today = true;
                self.stats.force_closes += 1;
                info!(
                    at = %primary.datetime,
                    price = primary.close,
                    direction = %snapshot.direction,
                    quantity = snapshot.size,
                    "Force close"
                );
            }
            return vec![exit];
        }

        // ===== range / reference =====
        let trading_day_enabled = self.params.trades_on(day.weekday());

        if self.range_builder.update(&mut day.opening_range, auxiliary, trading_day_enabled)
            == RangeUpdate::Finalized
        {
            if let (Some((high, low)), Some(start), Some(end)) = (
                day.opening_range.bounds(),
                day.opening_range.window_start,
                day.opening_range.window_end,
            ) {
                let annotation = Annotation::RangeBox {
                    date: day.date,
                    start,
                    end,
                    high,
                    low,
                };
                draw(&mut self.sink, day, annotation);
            }
        }

        if let Some(price) =
            day.reference_level
                .try_capture(&self.params.reference, auxiliary, trading_day_enabled)
        {
            let annotation = Annotation::ReferenceLine {
                date: day.date,
                price,
                from: day.date.and_time(self.params.session.start),
                to: day.date.and_time(self.params.session.end),
            };
            draw(&mut self.sink, day, annotation);
        }

        // ===== filters / entry =====
        let verdict = self
            .filters
            .evaluate(&day.opening_range, &day.reference_level, &event.indicators);

        let ctx = EntryContext {
            close: primary.close,
            atr: event.indicators.atr,
            in_session: self.params.session.contains_datetime(&auxiliary.datetime),
            trading_day_enabled,
            range: &day.opening_range,
            flat: self.positions.is_flat() && self.gateway.position().is_flat(),
            filters: verdict,
            entry_taken_today: day.entry_taken_today,
            force_closed_today: day.force_closed_today,
        };

        if ctx.in_session && ctx.flat && !ctx.entry_taken_today && !verdict.all() {
            debug!(
                volume = verdict.volume,
                range_size = verdict.range_size,
                reference = verdict.reference,
                "Entry blocked by filters"
            );
        }

        if let Some(signal) = self.evaluator.evaluate(&ctx) {
            day.entry_taken_today = true;
            let intents = self.positions.open(&signal);
            let mut emitted = Vec::with_capacity(intents.len());
            let mut iter = intents.into_iter();

            if let Some(open) = iter.next() {
                let accepted = submit(&mut self.gateway, &mut self.stats, &open);
                emitted.push(open);
                if !accepted {
                    self.positions.reset();
                    return emitted;
                }
            }
            for intent in iter {
                if !submit(&mut self.gateway, &mut self.stats, &intent) {
                    self.positions.note_rejected(&intent);
                }
                emitted.push(intent);
            }

            self.positions.reconcile(&self.gateway.position());
            self.stats.entries += 1;
            info!(
                at = %primary.datetime,
                direction = %signal.direction,
                entry = signal.entry_price,
                stop = signal.stop,
                target = signal.target,
                range_high = day.opening_range.high(),
                range_low = day.opening_range.low(),
                "Breakout entry"
            );
            let date = day.date;
            self.draw_entry(date, primary.datetime, &signal);
            return emitted;
        }

        // ===== management =====
        if self.positions.is_flat() || day.force_closed_today {
            return Vec::new();
        }
        let intents = self.positions.manage(primary.close, event.indicators.atr);
        for intent in &intents {
            if !submit(&mut self.gateway, &mut self.stats, intent) {
                self.positions.note_rejected(intent);
            }
        }
        if !intents.is_empty() {
            self.positions.reconcile(&self.gateway.position());
        }
        intents
    }

    fn draw_entry(&mut self, date: NaiveDate, at: NaiveDateTime, signal: &EntrySignal) {
        let Some(day) = self.session.current_mut() else {
            return;
        };
        draw(
            &mut self.sink,
            day,
            Annotation::StopTargetMarkers {
                date,
                tag: signal.direction.to_string(),
                at,
                stop: signal.stop,
                target: signal.target,
            },
        );
        if self.params.show_atr_levels {
            draw(
                &mut self.sink,
                day,
                Annotation::atr_levels(
                    date,
                    signal.direction,
                    signal.entry_price,
                    signal.atr,
                    at,
                    date.and_time(self.params.force_close),
                ),
            );
        }
    }
}

/// Forward one intent; returns whether the gateway accepted it
fn submit<G: ExecutionGateway>(gateway: &mut G, stats: &mut EngineStats, intent: &OrderIntent) -> bool {
    *stats.intents_by_kind.entry(intent.kind()).or_insert(0) += 1;
    match gateway.submit(intent) {
        Ok(()) => true,
        Err(e) => {
            stats.rejections += 1;
            warn!(
                kind = intent.kind(),
                tag = %intent.signal_name(),
                intent = ?intent,
                error = %e,
                "Gateway rejected intent"
            );
            false
        }
    }
}

fn draw<A: AnnotationSink>(sink: &mut A, day: &mut TradingDay, annotation: Annotation) {
    if day.mark_drawn(&annotation.key()) {
        sink.draw(annotation);
    }
}
