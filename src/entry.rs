//! Once-per-day breakout entry decision

use serde::Serialize;

use crate::config::StrategyParams;
use crate::filters::FilterVerdict;
use crate::opening_range::OpeningRange;
use crate::{Direction, TradeDirection};

/// Inputs to the entry decision for one primary bar
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub close: f64,
    pub atr: Option<f64>,
    pub in_session: bool,
    pub trading_day_enabled: bool,
    pub range: &'a OpeningRange,
    /// Flat both locally and as reported by the gateway
    pub flat: bool,
    pub filters: FilterVerdict,
    pub entry_taken_today: bool,
    pub force_closed_today: bool,
}

/// Accepted breakout with its initial protective levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntrySignal {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
    pub quantity: u32,
    pub atr: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EntrySignalEvaluator {
    trade_direction: TradeDirection,
    atr_multiplier: f64,
    tp_multiplier: f64,
    contracts: u32,
}

impl EntrySignalEvaluator {
    pub fn new(params: &StrategyParams) -> Self {
        Self {
            trade_direction: params.trade_direction,
            atr_multiplier: params.atr_multiplier,
            tp_multiplier: params.tp_multiplier,
            contracts: params.contracts,
        }
    }

    /// Conditions shared by both sides
    fn gates_open(&self, ctx: &EntryContext) -> bool {
        ctx.in_session
            && ctx.trading_day_enabled
            && ctx.flat
            && ctx.filters.all()
            && !ctx.entry_taken_today
            && !ctx.force_closed_today
    }

    pub fn long_eligible(&self, ctx: &EntryContext) -> bool {
        self.trade_direction.allows(Direction::Long)
            && self.gates_open(ctx)
            && ctx.range.bounds().is_some_and(|(high, _)| ctx.close > high)
    }

    pub fn short_eligible(&self, ctx: &EntryContext) -> bool {
        self.trade_direction.allows(Direction::Short)
            && self.gates_open(ctx)
            && ctx.range.bounds().is_some_and(|(_, low)| ctx.close < low)
    }

    pub fn evaluate(&self, ctx: &EntryContext) -> Option<EntrySignal> {
        let direction = if self.long_eligible(ctx) {
            Direction::Long
        } else if self.short_eligible(ctx) {
            Direction::Short
        } else {
            return None;
        };

        let atr = ctx.atr.filter(|a| a.is_finite())?;
        let stop_distance = atr * self.atr_multiplier;
        let target_distance = stop_distance * self.tp_multiplier;

        Some(EntrySignal {
            direction,
            entry_price: ctx.close,
            stop: direction.offset(ctx.close, -stop_distance),
            target: direction.offset(ctx.close, target_distance),
            quantity: self.contracts,
            atr,
        })
    }
}
