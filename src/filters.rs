//! Entry confirmation filters
//!
//! Three independent gates that must all pass before a breakout is taken:
//! volume, minimum range size and the reference-level offset.

use serde::Serialize;

use crate::config::StrategyParams;
use crate::opening_range::{OpeningRange, ReferenceLevel};
use crate::IndicatorSnapshot;

/// Result of evaluating each filter on one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterVerdict {
    pub volume: bool,
    pub range_size: bool,
    pub reference: bool,
}

impl FilterVerdict {
    pub fn all(&self) -> bool {
        self.volume && self.range_size && self.reference
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationFilterSet {
    enable_volume: bool,
    volume_multiplier: f64,
    min_range_size: f64,
    enable_reference: bool,
    reference_points_above: f64,
}

impl ConfirmationFilterSet {
    pub fn new(params: &StrategyParams) -> Self {
        Self {
            enable_volume: params.enable_volume_filter,
            volume_multiplier: params.volume_multiplier,
            min_range_size: params.min_range_size,
            enable_reference: params.enable_reference_filter,
            reference_points_above: params.reference_points_above,
        }
    }

    /// Auxiliary-bar volume must exceed `multiplier × SMA(volume)`
    pub fn volume_ok(&self, indicators: &IndicatorSnapshot) -> bool {
        if !self.enable_volume {
            return true;
        }
        indicators
            .volume_sma
            .is_some_and(|sma| indicators.volume > self.volume_multiplier * sma)
    }

    pub fn range_size_ok(&self, range: &OpeningRange) -> bool {
        range.size().is_some_and(|size| size >= self.min_range_size)
    }

    /// The range high must clear the reference level by the configured offset.
    ///
    /// Keyed off the range high for both trade directions.
    pub fn reference_ok(&self, range: &OpeningRange, reference: &ReferenceLevel) -> bool {
        if !self.enable_reference {
            return true;
        }
        match (range.high(), reference.price()) {
            (Some(high), Some(level)) => high >= level + self.reference_points_above,
            _ => false,
        }
    }

    pub fn evaluate(
        &self,
        range: &OpeningRange,
        reference: &ReferenceLevel,
        indicators: &IndicatorSnapshot,
    ) -> FilterVerdict {
        FilterVerdict {
            volume: self.volume_ok(indicators),
            range_size: self.range_size_ok(range),
            reference: self.reference_ok(range, reference),
        }
    }
}
