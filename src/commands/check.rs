//! Config check command implementation

use anyhow::{Context, Result};
use chrono::Weekday;
use orb_breakout::time_window::format_time;
use orb_breakout::{Config, StrategyParams};
use tracing::info;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let params = StrategyParams::try_from(&config)
        .with_context(|| format!("Invalid configuration in {}", config_path))?;
    info!("Configuration valid: {}", config_path);

    let days: Vec<&str> = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .filter(|d| params.trades_on(*d))
    .map(|d| match d {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    })
    .collect();

    let on_off = |b: bool| if b { "on" } else { "off" };

    println!("\n{}", "=".repeat(60));
    println!("CONFIGURATION - {} ({})", config.instrument, config.version);
    println!("{}", "=".repeat(60));
    println!("Direction:          {:?}", params.trade_direction);
    println!("Trading Days:       {}", days.join(", "));
    println!(
        "Opening Range:      {} - {}",
        format_time(params.opening_range.start),
        format_time(params.opening_range.end)
    );
    println!("Session End:        {}", format_time(params.session.end));
    println!("Reference Time:     {}", format_time(params.reference.start));
    println!("Force Close:        {}", format_time(params.force_close));
    println!("Contracts:          {}", params.contracts);
    println!(
        "ATR x / TP x:       {:.2} / {:.2}",
        params.atr_multiplier, params.tp_multiplier
    );
    println!("Min Range Size:     {:.2}", params.min_range_size);
    println!(
        "Breakeven:          {} ({:.2} ATR)",
        on_off(params.enable_breakeven),
        params.breakeven_trigger_atr
    );
    println!(
        "Add-on:             {} (+{} @ {:.2}, partial @ {:.2})",
        on_off(params.enable_add_on),
        params.add_contracts,
        params.add_threshold_points,
        params.partial_threshold_points
    );
    println!(
        "Trailing:           {} (activate {:.2}, buffer {:.2})",
        on_off(params.enable_trailing),
        params.trail_activation_points,
        params.trail_buffer_points
    );
    println!(
        "Volume Filter:      {} ({:.2}x SMA)",
        on_off(params.enable_volume_filter),
        params.volume_multiplier
    );
    println!(
        "Reference Filter:   {} (+{:.2})",
        on_off(params.enable_reference_filter),
        params.reference_points_above
    );
    println!("Warm-up Bars:       {}", params.bars_required);
    println!(
        "Feed:               {}m primary / {}m auxiliary, ATR({}), Volume SMA({})",
        config.feed.primary_minutes,
        config.feed.auxiliary_minutes,
        config.feed.atr_period,
        config.feed.volume_sma_period
    );
    println!("{}", "=".repeat(60));

    Ok(())
}
