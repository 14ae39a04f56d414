//! Opening-Range Breakout Engine
//!
//! Intraday breakout strategy for index futures: builds the opening range from
//! an auxiliary bar series, confirms the breakout with volume, range-size and
//! reference-level filters, enters at most once per day on the primary series,
//! manages the position through staged stop and scaling rules, and flattens at
//! a fixed wall-clock time.

pub mod annotations;
pub mod config;
pub mod data;
pub mod engine;
pub mod entry;
pub mod filters;
pub mod force_close;
pub mod gateway;
pub mod opening_range;
pub mod position;
pub mod session;
pub mod time_window;
pub mod types;

pub use config::{Config, StrategyParams};
pub use engine::OrbEngine;
pub use gateway::{DryRunGateway, ExecutionGateway};
pub use types::*;
