//! Bar feed loading
//!
//! Reads the primary (entry) series and the auxiliary (range/indicator) series
//! from CSV files and stitches them into a single stream of [`BarEvent`]s.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::StringRecord;
use itertools::Itertools;
use std::path::Path;
use tracing::{info, warn};

use crate::{Bar, BarEvent, IndicatorSnapshot};

// =============================================================================
// Constants
// =============================================================================

/// Accepted timestamp layouts, all exchange-local
pub const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Auxiliary bar together with the indicator values sampled on it
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryBar {
    pub bar: Bar,
    pub indicators: IndicatorSnapshot,
}

// =============================================================================
// CSV parsing
// =============================================================================

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

fn field<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str> {
    record
        .get(idx)
        .map(str::trim)
        .with_context(|| format!("Missing {} column", name))
}

fn number(record: &StringRecord, idx: usize, name: &str) -> Result<f64> {
    field(record, idx, name)?
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Empty cell means the indicator has not warmed up yet
fn optional_number(record: &StringRecord, idx: usize, name: &str) -> Result<Option<f64>> {
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("Failed to parse {}", name)),
    }
}

fn parse_bar(record: &StringRecord) -> Result<Bar> {
    let datetime = parse_datetime(field(record, 0, "datetime")?)?;
    let bar = Bar::new(
        datetime,
        number(record, 1, "open")?,
        number(record, 2, "high")?,
        number(record, 3, "low")?,
        number(record, 4, "close")?,
        number(record, 5, "volume")?,
    )?;
    Ok(bar)
}

fn read_rows<T>(
    path: &Path,
    mut parse: impl FnMut(&StringRecord) -> Result<T>,
) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;
        rows.push(parse(&record).with_context(|| format!("Invalid row {}", row_idx + 1))?);
    }
    Ok(rows)
}

/// Load the primary series: `datetime,open,high,low,close,volume`
pub fn load_primary_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let bars = read_rows(path, parse_bar)?;
    report_disorder("primary", bars.iter().map(|b| b.datetime));
    info!(bars = bars.len(), file = %path.display(), "Loaded primary series");
    Ok(bars)
}

/// Load the auxiliary series: primary columns plus `atr,volume_sma`
pub fn load_auxiliary_csv(path: impl AsRef<Path>) -> Result<Vec<AuxiliaryBar>> {
    let path = path.as_ref();
    let bars = read_rows(path, |record| {
        let bar = parse_bar(record)?;
        let indicators = IndicatorSnapshot {
            atr: optional_number(record, 6, "atr")?,
            volume: bar.volume,
            volume_sma: optional_number(record, 7, "volume_sma")?,
        };
        Ok(AuxiliaryBar { bar, indicators })
    })?;
    report_disorder("auxiliary", bars.iter().map(|b| b.bar.datetime));
    info!(bars = bars.len(), file = %path.display(), "Loaded auxiliary series");
    Ok(bars)
}

fn report_disorder(series: &str, times: impl Iterator<Item = NaiveDateTime>) {
    for (prev, next) in times.tuple_windows() {
        if next <= prev {
            warn!(series, %prev, %next, "Timestamps out of order");
        }
    }
}

// =============================================================================
// Alignment
// =============================================================================

/// Pair each primary bar with the latest auxiliary bar stamped at or before it.
///
/// Primary bars that precede the first auxiliary bar are dropped.
pub fn align_feeds(primary: &[Bar], auxiliary: &[AuxiliaryBar]) -> Vec<BarEvent> {
    let mut events = Vec::with_capacity(primary.len());
    let mut next_aux = 0;
    let mut current: Option<&AuxiliaryBar> = None;
    let mut dropped = 0usize;

    for bar in primary {
        while next_aux < auxiliary.len() && auxiliary[next_aux].bar.datetime <= bar.datetime {
            current = Some(&auxiliary[next_aux]);
            next_aux += 1;
        }
        match current {
            Some(aux) => events.push(BarEvent {
                primary: bar.clone(),
                auxiliary: aux.bar.clone(),
                indicators: aux.indicators,
            }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped, "Primary bars before the first auxiliary bar were skipped");
    }
    events
}
