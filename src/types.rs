//! Core data types used across the breakout engine

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error, PartialEq)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be finite: open={open}, high={high}, low={low}, close={close}")]
    NonFinitePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV bar stamped with exchange-local wall-clock time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a new bar with validation
    pub fn new(
        datetime: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(datetime, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        datetime: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the bar data.
    ///
    /// Prices are only required to be finite: spread instruments can legitimately
    /// trade at zero or below.
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
        {
            return Err(BarValidationError::NonFinitePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Indicator values supplied alongside each auxiliary bar.
///
/// The engine treats these as opaque inputs; `None` means the provider has not
/// warmed up yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub atr: Option<f64>,
    pub volume: f64,
    pub volume_sma: Option<f64>,
}

/// One step of the synchronized feed: the primary bar that just closed, the most
/// recent auxiliary bar, and the indicator values sampled on that auxiliary bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub primary: Bar,
    pub auxiliary: Bar,
    pub indicators: IndicatorSnapshot,
}

/// Market direction of a position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Flat,
    Long,
    Short,
}

impl Direction {
    pub fn is_flat(self) -> bool {
        self == Direction::Flat
    }

    /// Profit in price units of a move from `entry` to `price`
    pub fn points_gained(self, entry: f64, price: f64) -> f64 {
        match self {
            Direction::Long => price - entry,
            Direction::Short => entry - price,
            Direction::Flat => 0.0,
        }
    }

    /// Shift `price` by `points` towards profit (+1) for this direction
    pub fn offset(self, price: f64, points: f64) -> f64 {
        match self {
            Direction::Long => price + points,
            Direction::Short => price - points,
            Direction::Flat => price,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Flat => "Flat",
            Direction::Long => "Long",
            Direction::Short => "Short",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sides the strategy is allowed to trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    #[default]
    LongOnly,
    ShortOnly,
    Both,
}

impl TradeDirection {
    pub fn allows(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (TradeDirection::LongOnly | TradeDirection::Both, Direction::Long)
                | (TradeDirection::ShortOnly | TradeDirection::Both, Direction::Short)
        )
    }
}

impl std::str::FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "longonly" | "long" => Ok(TradeDirection::LongOnly),
            "shortonly" | "short" => Ok(TradeDirection::ShortOnly),
            "both" => Ok(TradeDirection::Both),
            _ => Err(format!(
                "Unknown trade direction: {}. Use 'LongOnly', 'ShortOnly' or 'Both'",
                s
            )),
        }
    }
}

/// Order leg a stop/target/exit refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// Base entry
    Entry,
    /// Scaling-in lot
    AddOn,
}

/// Requested action handed to the execution gateway.
///
/// Intents are descriptions, not executions: the gateway owns real order state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    OpenLong { quantity: u32 },
    OpenShort { quantity: u32 },
    AddLong { quantity: u32 },
    AddShort { quantity: u32 },
    SetStop { leg: Leg, direction: Direction, price: f64 },
    SetTarget { leg: Leg, direction: Direction, price: f64 },
    ExitPartial { leg: Leg, direction: Direction, quantity: u32 },
    ExitAll { direction: Direction, quantity: u32 },
}

impl OrderIntent {
    pub fn open(direction: Direction, quantity: u32) -> Option<Self> {
        match direction {
            Direction::Long => Some(OrderIntent::OpenLong { quantity }),
            Direction::Short => Some(OrderIntent::OpenShort { quantity }),
            Direction::Flat => None,
        }
    }

    pub fn add(direction: Direction, quantity: u32) -> Option<Self> {
        match direction {
            Direction::Long => Some(OrderIntent::AddLong { quantity }),
            Direction::Short => Some(OrderIntent::AddShort { quantity }),
            Direction::Flat => None,
        }
    }

    /// Short kind name used for log fields and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            OrderIntent::OpenLong { .. } => "OpenLong",
            OrderIntent::OpenShort { .. } => "OpenShort",
            OrderIntent::AddLong { .. } => "AddLong",
            OrderIntent::AddShort { .. } => "AddShort",
            OrderIntent::SetStop { .. } => "SetStop",
            OrderIntent::SetTarget { .. } => "SetTarget",
            OrderIntent::ExitPartial { .. } => "ExitPartial",
            OrderIntent::ExitAll { .. } => "ExitAll",
        }
    }

    /// Signal name the gateway uses to tie stops/targets/exits to their entry
    pub fn signal_name(&self) -> String {
        match self {
            OrderIntent::OpenLong { .. } => signal_name(Direction::Long, Leg::Entry),
            OrderIntent::OpenShort { .. } => signal_name(Direction::Short, Leg::Entry),
            OrderIntent::AddLong { .. } => signal_name(Direction::Long, Leg::AddOn),
            OrderIntent::AddShort { .. } => signal_name(Direction::Short, Leg::AddOn),
            OrderIntent::SetStop { leg, direction, .. }
            | OrderIntent::SetTarget { leg, direction, .. }
            | OrderIntent::ExitPartial { leg, direction, .. } => signal_name(*direction, *leg),
            OrderIntent::ExitAll { .. } => "ForceClose".to_string(),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            OrderIntent::OpenLong { .. } | OrderIntent::OpenShort { .. }
        )
    }
}

pub fn signal_name(direction: Direction, leg: Leg) -> String {
    match leg {
        Leg::Entry => direction.as_str().to_string(),
        Leg::AddOn => format!("{}Add", direction.as_str()),
    }
}
