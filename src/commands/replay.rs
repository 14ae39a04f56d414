//! Replay command implementation

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use orb_breakout::annotations::{Annotation, AnnotationSink, TracingAnnotations};
use orb_breakout::engine::EngineStats;
use orb_breakout::{
    data, Config, DryRunGateway, ExecutionGateway, OrbEngine, OrderIntent, StrategyParams,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use tracing::{debug, info};

/// Logs every annotation and keeps a copy for the JSON report
#[derive(Default)]
struct RecordingSink {
    log: TracingAnnotations,
    kept: Vec<Annotation>,
}

impl AnnotationSink for RecordingSink {
    fn draw(&mut self, annotation: Annotation) {
        self.kept.push(annotation.clone());
        self.log.draw(annotation);
    }
}

#[derive(Serialize)]
struct TimedIntent {
    at: NaiveDateTime,
    intent: OrderIntent,
}

#[derive(Serialize)]
struct ReplayReport<'a> {
    instrument: &'a str,
    stats: &'a EngineStats,
    days_seen: usize,
    intents: Vec<TimedIntent>,
    annotations: Vec<Annotation>,
}

pub fn run(
    config_path: String,
    primary_override: Option<String>,
    auxiliary_override: Option<String>,
    output: Option<String>,
) -> Result<()> {
    info!("Starting replay");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);
    let params = StrategyParams::try_from(&config).context("Invalid strategy configuration")?;

    let primary_path = primary_override
        .map(Into::into)
        .unwrap_or_else(|| config.replay.primary_path());
    let auxiliary_path = auxiliary_override
        .map(Into::into)
        .unwrap_or_else(|| config.replay.auxiliary_path());

    let primary = data::load_primary_csv(&primary_path)
        .with_context(|| format!("Failed to load primary series {}", primary_path.display()))?;
    let auxiliary = data::load_auxiliary_csv(&auxiliary_path).with_context(|| {
        format!("Failed to load auxiliary series {}", auxiliary_path.display())
    })?;

    let events = data::align_feeds(&primary, &auxiliary);
    info!(events = events.len(), "Feeds aligned");

    let mut engine = OrbEngine::new(params, DryRunGateway::new(), RecordingSink::default());
    let mut intents = Vec::new();
    for event in &events {
        for intent in engine.on_bar(event) {
            debug!(at = %event.primary.datetime, kind = intent.kind(), "Intent emitted");
            intents.push(TimedIntent {
                at: event.primary.datetime,
                intent,
            });
        }
    }

    let days_seen = engine.days_seen();
    let (gateway, sink, stats) = engine.into_parts();

    println!("\n{}", "=".repeat(60));
    println!("REPLAY RESULTS - {}", config.instrument);
    println!("{}", "=".repeat(60));
    println!("Bars Seen:          {}", stats.bars_seen);
    println!("Bars Evaluated:     {}", stats.bars_evaluated);
    println!("Trading Days:       {}", days_seen);
    println!("Entries:            {}", stats.entries);
    println!("Force Closes:       {}", stats.force_closes);
    println!("Rejections:         {}", stats.rejections);
    for (kind, count) in &stats.intents_by_kind {
        println!("  {:<18}{}", format!("{}:", kind), count);
    }
    println!("Open At End:        {}", gateway.position().size);
    println!("{}", "=".repeat(60));

    if let Some(path) = output.or_else(|| config.replay.output_file.clone()) {
        let report = ReplayReport {
            instrument: &config.instrument,
            stats: &stats,
            days_seen,
            intents,
            annotations: sink.kept,
        };
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("Failed to write replay report")?;
        info!("Report written to: {}", path);
    }

    info!("Replay completed successfully");
    Ok(())
}
