//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides, and validates the raw strategy inputs into
//! [`StrategyParams`] before any bar is processed.

use anyhow::{Context, Result};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::WeekdayTable;
use crate::time_window::{decode_hhmm, parse_time_of_day, TimeWindow};
use crate::TradeDirection;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid time for '{field}': '{value}' (expected HH:mm or HHmm)")]
    InvalidTime { field: String, value: String },

    #[error("'{field}' must be > 0 (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("'{field}' must be >= 0 and finite (got {value})")]
    Negative { field: &'static str, value: f64 },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

fn default_version() -> String {
    "v1.orb".to_string()
}

fn default_instrument() -> String {
    "ES".to_string()
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Apply overrides from the environment (after `.env` has been loaded)
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(direction) = std::env::var("ORB_TRADE_DIRECTION") {
            self.strategy.trade_direction = direction
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid ORB_TRADE_DIRECTION")?;
        }
        if let Ok(contracts) = std::env::var("ORB_CONTRACTS") {
            self.strategy.contracts = contracts
                .trim()
                .parse()
                .with_context(|| format!("Invalid ORB_CONTRACTS: {}", contracts))?;
        }
        Ok(())
    }

    /// Validate the strategy and feed sections
    pub fn validate(&self) -> std::result::Result<StrategyParams, ConfigError> {
        if self.feed.bars_required == 0 {
            return Err(ConfigError::NotPositive {
                field: "bars_required",
                value: 0.0,
            });
        }
        for (field, value) in [
            ("primary_minutes", self.feed.primary_minutes as usize),
            ("auxiliary_minutes", self.feed.auxiliary_minutes as usize),
            ("atr_period", self.feed.atr_period),
            ("volume_sma_period", self.feed.volume_sma_period),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { field, value: 0.0 });
            }
        }
        let mut params = StrategyParams::try_from(&self.strategy)?;
        params.bars_required = self.feed.bars_required;
        Ok(params)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: default_version(),
            instrument: default_instrument(),
            strategy: StrategyConfig::default(),
            feed: FeedConfig::default(),
            replay: ReplayConfig::default(),
        }
    }
}

/// A configured time of day: `"09:30"` or `930`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeOfDayInput {
    Encoded(u32),
    Text(String),
}

impl TimeOfDayInput {
    pub fn text(s: &str) -> Self {
        TimeOfDayInput::Text(s.to_string())
    }

    fn parse(&self, field: &str) -> std::result::Result<NaiveTime, ConfigError> {
        match self {
            TimeOfDayInput::Text(s) => parse_time_of_day(field, s),
            TimeOfDayInput::Encoded(n) => decode_hhmm(*n).ok_or_else(|| ConfigError::InvalidTime {
                field: field.to_string(),
                value: n.to_string(),
            }),
        }
    }
}

/// Per-weekday trading switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingDays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Default for TradingDays {
    fn default() -> Self {
        TradingDays {
            monday: true,
            tuesday: true,
            wednesday: false,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
        }
    }
}

impl From<&TradingDays> for WeekdayTable {
    fn from(days: &TradingDays) -> Self {
        WeekdayTable::new([
            days.monday,
            days.tuesday,
            days.wednesday,
            days.thursday,
            days.friday,
            days.saturday,
            days.sunday,
        ])
    }
}

/// Raw strategy inputs as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub trade_direction: TradeDirection,
    pub trading_days: TradingDays,

    /// ATR multiple for the initial stop distance
    pub atr_multiplier: f64,
    /// Target distance as a multiple of the stop distance
    pub tp_multiplier: f64,
    /// Base entry quantity
    pub contracts: u32,

    pub enable_breakeven: bool,
    /// Profit (in ATRs) that moves the stop to breakeven
    pub breakeven_trigger_atr: f64,

    pub enable_add_on: bool,
    pub add_contracts: u32,
    pub add_threshold_points: f64,
    pub partial_threshold_points: f64,

    pub enable_trailing: bool,
    pub trail_activation_points: f64,
    pub trail_buffer_points: f64,

    pub or_start: TimeOfDayInput,
    pub or_end: TimeOfDayInput,
    pub session_end: TimeOfDayInput,
    pub force_close: TimeOfDayInput,
    pub reference_time: TimeOfDayInput,

    pub min_range_size: f64,

    pub enable_volume_filter: bool,
    pub volume_multiplier: f64,

    pub enable_reference_filter: bool,
    pub reference_points_above: f64,

    /// Draw 1x/2x/3x ATR projections from the entry
    pub show_atr_levels: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            trade_direction: TradeDirection::LongOnly,
            trading_days: TradingDays::default(),
            atr_multiplier: 1.0,
            tp_multiplier: 3.5,
            contracts: 1,
            enable_breakeven: true,
            breakeven_trigger_atr: 1.0,
            enable_add_on: false,
            add_contracts: 1,
            add_threshold_points: 10.0,
            partial_threshold_points: 20.0,
            enable_trailing: false,
            trail_activation_points: 15.0,
            trail_buffer_points: 5.0,
            or_start: TimeOfDayInput::text("09:35"),
            or_end: TimeOfDayInput::text("09:45"),
            session_end: TimeOfDayInput::text("10:50"),
            force_close: TimeOfDayInput::text("15:55"),
            reference_time: TimeOfDayInput::text("01:00"),
            min_range_size: 5.0,
            enable_volume_filter: false,
            volume_multiplier: 1.5,
            enable_reference_filter: true,
            reference_points_above: 6.0,
            show_atr_levels: true,
        }
    }
}

/// Feed / indicator provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Bars required on both series before any signal is evaluated
    pub bars_required: usize,
    pub primary_minutes: u32,
    pub auxiliary_minutes: u32,
    pub atr_period: usize,
    pub volume_sma_period: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            bars_required: 20,
            primary_minutes: 1,
            auxiliary_minutes: 5,
            atr_period: 4,
            volume_sma_period: 20,
        }
    }
}

/// Replay command inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub data_dir: String,
    pub primary_file: String,
    pub auxiliary_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            data_dir: "data".to_string(),
            primary_file: "ES_1m.csv".to_string(),
            auxiliary_file: "ES_5m.csv".to_string(),
            output_file: None,
        }
    }
}

impl ReplayConfig {
    pub fn primary_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.primary_file)
    }

    pub fn auxiliary_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.auxiliary_file)
    }
}

/// Validated strategy parameters with parsed times
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub trade_direction: TradeDirection,
    pub trading_days: WeekdayTable,
    pub atr_multiplier: f64,
    pub tp_multiplier: f64,
    pub contracts: u32,
    pub enable_breakeven: bool,
    pub breakeven_trigger_atr: f64,
    pub enable_add_on: bool,
    pub add_contracts: u32,
    pub add_threshold_points: f64,
    pub partial_threshold_points: f64,
    pub enable_trailing: bool,
    pub trail_activation_points: f64,
    pub trail_buffer_points: f64,
    pub opening_range: TimeWindow,
    /// `[or_start, session_end]`
    pub session: TimeWindow,
    /// Reference capture window: one minute starting at the reference time
    pub reference: TimeWindow,
    pub force_close: NaiveTime,
    pub min_range_size: f64,
    pub enable_volume_filter: bool,
    pub volume_multiplier: f64,
    pub enable_reference_filter: bool,
    pub reference_points_above: f64,
    pub show_atr_levels: bool,
    pub bars_required: usize,
}

impl StrategyParams {
    pub fn trades_on(&self, weekday: Weekday) -> bool {
        self.trading_days.is_enabled(weekday)
    }

    /// Stop and target distances (in price units) for a given ATR
    pub fn stop_distance(&self, atr: f64) -> f64 {
        atr * self.atr_multiplier
    }

    pub fn target_distance(&self, atr: f64) -> f64 {
        atr * self.atr_multiplier * self.tp_multiplier
    }
}

fn positive(field: &'static str, value: f64) -> std::result::Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> std::result::Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn positive_count(field: &'static str, value: u32) -> std::result::Result<u32, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive {
            field,
            value: 0.0,
        })
    }
}

impl TryFrom<&StrategyConfig> for StrategyParams {
    type Error = ConfigError;

    fn try_from(cfg: &StrategyConfig) -> std::result::Result<Self, Self::Error> {
        let or_start = cfg.or_start.parse("or_start")?;
        let or_end = cfg.or_end.parse("or_end")?;
        let session_end = cfg.session_end.parse("session_end")?;
        let force_close = cfg.force_close.parse("force_close")?;
        let reference_time = cfg.reference_time.parse("reference_time")?;
        let (reference_end, _) =
            reference_time.overflowing_add_signed(chrono::Duration::minutes(1));

        let (add_threshold_points, partial_threshold_points, add_contracts) = if cfg.enable_add_on
        {
            (
                positive("add_threshold_points", cfg.add_threshold_points)?,
                positive("partial_threshold_points", cfg.partial_threshold_points)?,
                positive_count("add_contracts", cfg.add_contracts)?,
            )
        } else {
            (
                non_negative("add_threshold_points", cfg.add_threshold_points)?,
                non_negative("partial_threshold_points", cfg.partial_threshold_points)?,
                cfg.add_contracts,
            )
        };

        let (trail_activation_points, trail_buffer_points) = if cfg.enable_trailing {
            (
                positive("trail_activation_points", cfg.trail_activation_points)?,
                positive("trail_buffer_points", cfg.trail_buffer_points)?,
            )
        } else {
            (
                non_negative("trail_activation_points", cfg.trail_activation_points)?,
                non_negative("trail_buffer_points", cfg.trail_buffer_points)?,
            )
        };

        Ok(StrategyParams {
            trade_direction: cfg.trade_direction,
            trading_days: WeekdayTable::from(&cfg.trading_days),
            atr_multiplier: positive("atr_multiplier", cfg.atr_multiplier)?,
            tp_multiplier: positive("tp_multiplier", cfg.tp_multiplier)?,
            contracts: positive_count("contracts", cfg.contracts)?,
            enable_breakeven: cfg.enable_breakeven,
            breakeven_trigger_atr: positive("breakeven_trigger_atr", cfg.breakeven_trigger_atr)?,
            enable_add_on: cfg.enable_add_on,
            add_contracts,
            add_threshold_points,
            partial_threshold_points,
            enable_trailing: cfg.enable_trailing,
            trail_activation_points,
            trail_buffer_points,
            opening_range: TimeWindow::new(or_start, or_end),
            session: TimeWindow::new(or_start, session_end),
            reference: TimeWindow::new(reference_time, reference_end),
            force_close,
            min_range_size: non_negative("min_range_size", cfg.min_range_size)?,
            enable_volume_filter: cfg.enable_volume_filter,
            volume_multiplier: positive("volume_multiplier", cfg.volume_multiplier)?,
            enable_reference_filter: cfg.enable_reference_filter,
            reference_points_above: non_negative(
                "reference_points_above",
                cfg.reference_points_above,
            )?,
            show_atr_levels: cfg.show_atr_levels,
            bars_required: FeedConfig::default().bars_required,
        })
    }
}

impl TryFrom<&Config> for StrategyParams {
    type Error = ConfigError;

    fn try_from(config: &Config) -> std::result::Result<Self, Self::Error> {
        config.validate()
    }
}
