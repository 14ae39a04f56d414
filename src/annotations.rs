//! Chart annotations
//!
//! Purely informational overlays the engine emits alongside its intents. A sink
//! may render, log, collect or drop them; the engine never reads them back.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Direction;

/// Multiples of ATR drawn from the entry in the profit direction
pub const ATR_LEVEL_MULTIPLES: [f64; 3] = [1.0, 2.0, 3.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    /// Finalized opening range
    RangeBox {
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
        high: f64,
        low: f64,
    },
    /// Captured reference level, spanning the opening range start to session end
    ReferenceLine {
        date: NaiveDate,
        price: f64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    /// Initial stop and target of an entry
    StopTargetMarkers {
        date: NaiveDate,
        tag: String,
        at: NaiveDateTime,
        stop: f64,
        target: f64,
    },
    /// 1x/2x/3x ATR lines from entry until force-close time
    AtrLevels {
        date: NaiveDate,
        direction: Direction,
        from: NaiveDateTime,
        to: NaiveDateTime,
        levels: [f64; 3],
    },
}

fn stamp(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

impl Annotation {
    /// Identity of the drawing; each key is emitted at most once per day
    pub fn key(&self) -> String {
        match self {
            Annotation::RangeBox { date, .. } => format!("ORB_Box_{}", stamp(date)),
            Annotation::ReferenceLine { date, .. } => format!("MidnightOpen_{}", stamp(date)),
            Annotation::StopTargetMarkers { date, tag, .. } => {
                format!("StopTarget_{}_{}", tag, stamp(date))
            }
            Annotation::AtrLevels {
                date, direction, ..
            } => format!("ATR_{}_{}", stamp(date), direction),
        }
    }

    pub fn atr_levels(
        date: NaiveDate,
        direction: Direction,
        entry_price: f64,
        atr: f64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Self {
        let levels = ATR_LEVEL_MULTIPLES.map(|m| direction.offset(entry_price, atr * m));
        Annotation::AtrLevels {
            date,
            direction,
            from,
            to,
            levels,
        }
    }
}

pub trait AnnotationSink {
    fn draw(&mut self, annotation: Annotation);
}

/// Collects everything, mostly for tests and JSON output
impl AnnotationSink for Vec<Annotation> {
    fn draw(&mut self, annotation: Annotation) {
        self.push(annotation);
    }
}

/// Discards everything
impl AnnotationSink for () {
    fn draw(&mut self, _annotation: Annotation) {}
}

/// Writes each annotation to the log at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnnotations;

impl AnnotationSink for TracingAnnotations {
    fn draw(&mut self, annotation: Annotation) {
        let key = annotation.key();
        match annotation {
            Annotation::RangeBox { high, low, start, end, .. } => {
                debug!(%key, high, low, %start, %end, "Draw range box");
            }
            Annotation::ReferenceLine { price, .. } => {
                debug!(%key, price, "Draw reference line");
            }
            Annotation::StopTargetMarkers { stop, target, .. } => {
                debug!(%key, stop, target, "Draw stop/target markers");
            }
            Annotation::AtrLevels { levels, to, .. } => {
                debug!(%key, atr1 = levels[0], atr2 = levels[1], atr3 = levels[2], %to, "Draw ATR levels");
            }
        }
    }
}
