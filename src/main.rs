//! Opening-range breakout engine - main entry point
//!
//! This binary provides two subcommands:
//! - replay: Run the engine over CSV bar files with a dry-run gateway
//! - check: Validate a configuration file and print the parsed parameters

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "orb-breakout")]
#[command(about = "Intraday opening-range breakout engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay historical bars through the engine
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/es_orb.json")]
        config: String,

        /// Primary (entry) series CSV, overrides the config file
        #[arg(long)]
        primary: Option<String>,

        /// Auxiliary (range/indicator) series CSV, overrides the config file
        #[arg(long)]
        auxiliary: Option<String>,

        /// Write emitted intents and annotations as JSON
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate a configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/es_orb.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, json: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // same format without ANSI colors, or one JSON object per event
    let (text_layer, json_layer) = if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(text_layer)
        .with(json_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Replay { .. } => "replay",
        Commands::Check { .. } => "check",
    };

    setup_logging(cli.verbose, cli.log_json, command_name)?;

    match cli.command {
        Commands::Replay {
            config,
            primary,
            auxiliary,
            output,
        } => commands::replay::run(config, primary, auxiliary, output),

        Commands::Check { config } => commands::check::run(config),
    }
}
