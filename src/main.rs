//! Passage monitor - doorway people detection from an overhead range finder
//!
//! Reads distance frames from a MaxSonar sensor on a serial port, takes the
//! first good reading as the clear-floor baseline, and prints a JSON line
//! every time something tall enough passes underneath.
//!
//! Module structure:
//! - `domain/` - Core types (DistanceSample, DetectionEvent, units)
//! - `io/` - External interfaces (serial port, frame reader, event sinks)
//! - `services/` - Business logic (Detector, Monitor loop)
//! - `infra/` - Infrastructure (Config, Metrics, Clock)

use anyhow::Context;
use clap::Parser;
use passage_monitor::infra::{Config, Metrics, SystemClock};
use passage_monitor::io::{
    create_event_channel, forward_events, FrameReader, SerialConnector, WriterSink,
};
use passage_monitor::services::{Detector, Monitor, MonitorSettings};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Passage monitor - overhead range finder people detection
#[derive(Parser, Debug)]
#[command(name = "passage-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the detection records
    // Default: INFO, use RUST_LOG=debug to see rejected frames
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = env!("GIT_HASH"), "passage-monitor starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        device = %config.serial_device(),
        baud = %config.serial_baud(),
        max_wait_ms = %config.max_wait().as_millis(),
        idle_delay_ms = %config.idle_delay().as_millis(),
        safety_margin_mm = %config.safety_margin_mm(),
        required_consecutive = %config.required_consecutive(),
        cooldown_ms = %config.cooldown().as_millis(),
        max_consecutive_timeouts = %config.max_consecutive_timeouts(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Detections flow from the blocking acquisition thread to stdout via a channel
    let (sink, event_rx) = create_event_channel(64);
    let writer = tokio::spawn(forward_events(event_rx, WriterSink::stdout()));

    let connector = SerialConnector::new(
        config.serial_device(),
        config.serial_baud(),
        config.serial_read_timeout(),
    );
    let reader = FrameReader::new(connector, SystemClock, Arc::clone(&metrics));
    let detector = Detector::new(config.detector_config());
    let monitor = Monitor::new(
        reader,
        detector,
        sink,
        MonitorSettings::from_config(&config),
        Arc::clone(&metrics),
    );

    // Serial polling is synchronous; keep it off the async workers
    let monitor_task = tokio::task::spawn_blocking(move || monitor.run(shutdown_rx));

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let outcome = monitor_task.await.context("monitor thread panicked")?;

    // The monitor owned the only sender, so the writer drains and exits
    let written = writer.await.context("event writer panicked")??;
    metrics.report().log();

    match outcome {
        Ok(detections) => {
            info!(
                detections = %detections,
                written = %written,
                "passage-monitor shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "passage-monitor stopped");
            Err(e.into())
        }
    }
}
