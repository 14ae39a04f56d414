//! Position state machine
//!
//! An open position moves through independent, latched stages layered on top
//! of the basic entered state:
//!
//! - **BreakevenMoved**: stop pulled to the average entry once profit reaches a
//!   multiple of ATR
//! - **Added**: one scaling-in lot added at a points threshold
//! - **PartialTaken**: the add-on quantity taken off again at a higher threshold
//! - **Trailing**: stop follows price at a fixed buffer and never loosens
//!
//! Stages can be active together. Each latches at most once per position and
//! all of them are cleared when the position returns to flat.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StrategyParams;
use crate::entry::EntrySignal;
use crate::gateway::PositionSnapshot;
use crate::{Direction, Leg, OrderIntent};

/// Bars that must elapse after the add-on before a partial exit
pub const MIN_BARS_BEFORE_PARTIAL: u32 = 2;

/// Management stage of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    BreakevenMoved,
    Added,
    PartialTaken,
    Trailing,
}

impl Stage {
    fn bit(self) -> u8 {
        match self {
            Stage::BreakevenMoved => 1,
            Stage::Added => 1 << 1,
            Stage::PartialTaken => 1 << 2,
            Stage::Trailing => 1 << 3,
        }
    }
}

/// Set of latched stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSet(u8);

impl StageSet {
    pub fn contains(&self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    /// Set `stage`; returns true only the first time
    pub fn latch(&mut self, stage: Stage) -> bool {
        let fresh = !self.contains(stage);
        self.0 |= stage.bit();
        fresh
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Tighten a stop toward price without ever loosening it.
///
/// An unset stop accepts any candidate.
pub fn tighten(direction: Direction, current: Option<f64>, candidate: f64) -> f64 {
    match (direction, current) {
        (_, None) => candidate,
        (Direction::Long, Some(stop)) => stop.max(candidate),
        (Direction::Short, Some(stop)) => stop.min(candidate),
        (Direction::Flat, Some(stop)) => stop,
    }
}

/// The engine's intended view of the open position.
///
/// `size == 0` exactly when `direction == Flat`. The gateway is the source of
/// truth for fills; see [`PositionManager::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub size: u32,
    pub average_entry_price: Option<f64>,
    /// Entry price of the base lot; profit targets are re-derived from it
    pub original_entry_price: Option<f64>,
    pub protective_stop: Option<f64>,
    pub profit_target: Option<f64>,
    pub stages: StageSet,
    pub bars_since_add: u32,
    /// Gateway has reported a non-zero size for this position
    pub acknowledged: bool,
    /// Last stop submission was rejected; re-sent on the next managed bar
    #[serde(default)]
    pub stop_pending: bool,
    /// Rejected target awaiting re-submission
    #[serde(default)]
    pub pending_target: Option<(Leg, f64)>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.direction.is_flat()
    }

    pub fn unrealized_points(&self, price: f64) -> Option<f64> {
        self.average_entry_price
            .map(|entry| self.direction.points_gained(entry, price))
    }

    /// Legs that currently carry a stop
    pub fn open_legs(&self) -> Vec<Leg> {
        if self.stages.contains(Stage::Added) && !self.stages.contains(Stage::PartialTaken) {
            vec![Leg::Entry, Leg::AddOn]
        } else {
            vec![Leg::Entry]
        }
    }
}

/// What a gateway snapshot did to the local position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Unchanged,
    /// Size or average price adopted from the gateway
    Synced,
    /// Gateway went flat; local position reset
    Closed,
    /// Gateway holds a position the engine is not tracking
    Untracked,
}

#[derive(Debug, Clone, Copy)]
struct ManagementParams {
    atr_multiplier: f64,
    tp_multiplier: f64,
    enable_breakeven: bool,
    breakeven_trigger_atr: f64,
    enable_add_on: bool,
    add_contracts: u32,
    add_threshold_points: f64,
    partial_threshold_points: f64,
    enable_trailing: bool,
    trail_activation_points: f64,
    trail_buffer_points: f64,
}

pub struct PositionManager {
    params: ManagementParams,
    position: Position,
}

impl PositionManager {
    pub fn new(params: &StrategyParams) -> Self {
        Self {
            params: ManagementParams {
                atr_multiplier: params.atr_multiplier,
                tp_multiplier: params.tp_multiplier,
                enable_breakeven: params.enable_breakeven,
                breakeven_trigger_atr: params.breakeven_trigger_atr,
                enable_add_on: params.enable_add_on,
                add_contracts: params.add_contracts,
                add_threshold_points: params.add_threshold_points,
                partial_threshold_points: params.partial_threshold_points,
                enable_trailing: params.enable_trailing,
                trail_activation_points: params.trail_activation_points,
                trail_buffer_points: params.trail_buffer_points,
            },
            position: Position::default(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_flat()
    }

    /// Replace the position with a fresh flat one
    pub fn reset(&mut self) {
        self.position = Position::default();
    }

    fn target_distance(&self, atr: f64) -> f64 {
        atr * self.params.atr_multiplier * self.params.tp_multiplier
    }

    /// Start a position from an accepted entry signal.
    ///
    /// Returns the open order followed by its initial stop and target.
    pub fn open(&mut self, signal: &EntrySignal) -> Vec<OrderIntent> {
        let direction = signal.direction;
        let Some(open) = OrderIntent::open(direction, signal.quantity) else {
            return Vec::new();
        };

        self.position = Position {
            direction,
            size: signal.quantity,
            average_entry_price: Some(signal.entry_price),
            original_entry_price: Some(signal.entry_price),
            protective_stop: Some(signal.stop),
            profit_target: Some(signal.target),
            ..Position::default()
        };

        info!(
            direction = %direction,
            quantity = signal.quantity,
            entry = signal.entry_price,
            stop = signal.stop,
            target = signal.target,
            atr = signal.atr,
            "Opening position"
        );

        vec![
            open,
            OrderIntent::SetStop {
                leg: Leg::Entry,
                direction,
                price: signal.stop,
            },
            OrderIntent::SetTarget {
                leg: Leg::Entry,
                direction,
                price: signal.target,
            },
        ]
    }

    /// Intent that flattens everything currently held
    pub fn exit_all(&self) -> Option<OrderIntent> {
        if self.position.is_flat() {
            return None;
        }
        Some(OrderIntent::ExitAll {
            direction: self.position.direction,
            quantity: self.position.size,
        })
    }

    /// Record a stop or target the gateway refused so the next bar re-asserts it
    pub fn note_rejected(&mut self, intent: &OrderIntent) {
        if self.position.is_flat() {
            return;
        }
        match *intent {
            OrderIntent::SetStop { price, .. } => {
                debug!(price, "Stop rejected; re-asserting next bar");
                self.position.stop_pending = true;
            }
            OrderIntent::SetTarget { leg, price, .. } => {
                debug!(?leg, price, "Target rejected; re-asserting next bar");
                self.position.pending_target = Some((leg, price));
            }
            _ => {}
        }
    }

    fn push_stop(&mut self, intents: &mut Vec<OrderIntent>) {
        self.position.stop_pending = false;
        if let Some(price) = self.position.protective_stop {
            for leg in self.position.open_legs() {
                intents.push(OrderIntent::SetStop {
                    leg,
                    direction: self.position.direction,
                    price,
                });
            }
        }
    }

    /// Advance the staged behaviours for one bar.
    ///
    /// Steps run in a fixed order: breakeven, add-on, partial exit, trailing
    /// activation, trailing ratchet, target re-assertion.
    pub fn manage(&mut self, close: f64, atr: Option<f64>) -> Vec<OrderIntent> {
        let mut intents = Vec::new();
        if self.position.is_flat() {
            return intents;
        }
        let direction = self.position.direction;
        let was_trailing = self.position.stages.contains(Stage::Trailing);

        if self.position.stages.contains(Stage::Added) {
            self.position.bars_since_add = self.position.bars_since_add.saturating_add(1);
        }

        // 1. breakeven
        if self.params.enable_breakeven && !self.position.stages.contains(Stage::BreakevenMoved) {
            if let (Some(profit), Some(atr), Some(entry)) = (
                self.position.unrealized_points(close),
                atr,
                self.position.average_entry_price,
            ) {
                if profit >= atr * self.params.breakeven_trigger_atr {
                    self.position.protective_stop =
                        Some(tighten(direction, self.position.protective_stop, entry));
                    self.position.stages.latch(Stage::BreakevenMoved);
                    info!(
                        stop = self.position.protective_stop,
                        profit_points = profit,
                        "Breakeven stop moved"
                    );
                    self.push_stop(&mut intents);
                }
            }
        }

        // 2. add-on
        if self.params.enable_add_on && !self.position.stages.contains(Stage::Added) {
            if let Some(profit) = self.position.unrealized_points(close) {
                if profit >= self.params.add_threshold_points {
                    self.add_on(close, atr, &mut intents);
                }
            }
        }

        // 3. partial exit of the add-on quantity
        if self.position.stages.contains(Stage::Added)
            && !self.position.stages.contains(Stage::PartialTaken)
            && self.position.bars_since_add >= MIN_BARS_BEFORE_PARTIAL
        {
            if let Some(profit) = self.position.unrealized_points(close) {
                if profit >= self.params.partial_threshold_points {
                    let quantity = self.params.add_contracts.min(self.position.size);
                    intents.push(OrderIntent::ExitPartial {
                        leg: Leg::AddOn,
                        direction,
                        quantity,
                    });
                    self.position.stages.latch(Stage::PartialTaken);
                    if quantity >= self.position.size {
                        // flat only once the gateway reports it
                        info!(quantity, profit_points = profit, "Partial exit takes the whole position");
                        return intents;
                    }
                    self.position.size -= quantity;
                    info!(quantity, remaining = self.position.size, profit_points = profit, "Partial exit");
                }
            }
        }

        // 4. trailing activation / 5. ratchet
        if self.params.enable_trailing {
            let trail_price = direction.offset(close, -self.params.trail_buffer_points);
            if !was_trailing {
                let activate = self
                    .position
                    .unrealized_points(close)
                    .is_some_and(|profit| profit >= self.params.trail_activation_points);
                if activate {
                    self.position.protective_stop =
                        Some(tighten(direction, self.position.protective_stop, trail_price));
                    self.position.stages.latch(Stage::Trailing);
                    info!(stop = self.position.protective_stop, "Trailing stop activated");
                    self.push_stop(&mut intents);
                }
            } else {
                let tightened = tighten(direction, self.position.protective_stop, trail_price);
                if Some(tightened) != self.position.protective_stop {
                    self.position.protective_stop = Some(tightened);
                    debug!(stop = tightened, "Trailing stop ratcheted");
                    self.push_stop(&mut intents);
                }
            }
        }

        // 6. re-assertion of the entry target and anything the gateway refused
        if self.position.stop_pending {
            self.push_stop(&mut intents);
        }
        let mut entry_target_sent = false;
        if !self.position.stages.contains(Stage::PartialTaken) {
            if let (Some(entry), Some(atr)) = (self.position.original_entry_price, atr) {
                let target = direction.offset(entry, self.target_distance(atr));
                self.position.profit_target = Some(target);
                intents.push(OrderIntent::SetTarget {
                    leg: Leg::Entry,
                    direction,
                    price: target,
                });
                entry_target_sent = true;
            }
        }
        if let Some((leg, price)) = self.position.pending_target.take() {
            if !(leg == Leg::Entry && entry_target_sent) {
                intents.push(OrderIntent::SetTarget {
                    leg,
                    direction,
                    price,
                });
            }
        }

        intents
    }

    fn add_on(&mut self, close: f64, atr: Option<f64>, intents: &mut Vec<OrderIntent>) {
        let direction = self.position.direction;
        let quantity = self.params.add_contracts;
        let Some(add) = OrderIntent::add(direction, quantity) else {
            return;
        };
        intents.push(add);

        // local estimate until the gateway reports the real average
        let held = self.position.size as f64;
        let average = self
            .position
            .average_entry_price
            .map(|avg| (avg * held + close * quantity as f64) / (held + quantity as f64))
            .unwrap_or(close);
        self.position.average_entry_price = Some(average);
        self.position.size += quantity;
        self.position.stages.latch(Stage::Added);
        self.position.bars_since_add = 0;

        self.position.protective_stop =
            Some(tighten(direction, self.position.protective_stop, average));
        self.push_stop(intents);

        if let Some(atr) = atr {
            intents.push(OrderIntent::SetTarget {
                leg: Leg::AddOn,
                direction,
                price: direction.offset(close, self.target_distance(atr)),
            });
        }

        info!(
            quantity,
            size = self.position.size,
            average,
            stop = self.position.protective_stop,
            "Scaled into position"
        );
    }

    /// Fold the gateway's reported position into the local view.
    ///
    /// A zero size only closes the local position once the gateway has
    /// acknowledged it with a non-zero size; before that the entry is
    /// considered pending.
    pub fn reconcile(&mut self, snapshot: &PositionSnapshot) -> Reconciliation {
        if self.position.is_flat() {
            return if snapshot.size > 0 {
                Reconciliation::Untracked
            } else {
                Reconciliation::Unchanged
            };
        }

        if snapshot.size == 0 {
            if self.position.acknowledged {
                info!(direction = %self.position.direction, "Position closed at gateway");
                self.reset();
                return Reconciliation::Closed;
            }
            return Reconciliation::Unchanged;
        }

        if snapshot.direction != self.position.direction {
            return Reconciliation::Untracked;
        }

        let mut changed = !self.position.acknowledged;
        self.position.acknowledged = true;
        if snapshot.size != self.position.size {
            debug!(local = self.position.size, gateway = snapshot.size, "Position size synced");
            self.position.size = snapshot.size;
            changed = true;
        }
        if let Some(avg) = snapshot.average_price {
            if self.position.average_entry_price != Some(avg) {
                self.position.average_entry_price = Some(avg);
                changed = true;
            }
        }

        if changed {
            Reconciliation::Synced
        } else {
            Reconciliation::Unchanged
        }
    }
}
