//! Range finder probe
//!
//! Takes a handful of readings straight from the sensor and prints them, to
//! check wiring and mounting height before running the monitor.
//!
//! Usage:
//!   cargo run --bin range-probe -- --device /dev/ttyAMA0 --count 20

use clap::Parser;
use passage_monitor::domain::units::mm_to_feet_and_inches;
use passage_monitor::infra::{Config, Metrics, SystemClock};
use passage_monitor::io::{FrameReader, SerialConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "range-probe", about = "Print raw range finder readings")]
struct Args {
    /// Config file for serial settings
    #[arg(short, long)]
    config: Option<String>,

    /// Serial device, overrides the config file
    #[arg(long)]
    device: Option<String>,

    /// Number of readings to take
    #[arg(long, default_value = "10")]
    count: u32,

    /// Per-reading deadline in milliseconds, overrides the config file
    #[arg(long)]
    max_wait_ms: Option<u64>,

    /// Pause between readings in milliseconds
    #[arg(long, default_value = "250")]
    interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    let mut config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));
    if let Some(ref device) = args.device {
        config = config.with_serial_device(device);
    }
    if let Some(ms) = args.max_wait_ms {
        config = config.with_max_wait(Duration::from_millis(ms));
    }

    println!(
        "Probing {} at {} baud ({} readings, {} ms deadline)",
        config.serial_device(),
        config.serial_baud(),
        args.count,
        config.max_wait().as_millis()
    );

    let metrics = Arc::new(Metrics::new());
    let connector = SerialConnector::new(
        config.serial_device(),
        config.serial_baud(),
        config.serial_read_timeout(),
    );
    let mut reader = FrameReader::new(connector, SystemClock, Arc::clone(&metrics));

    let mut readings = Vec::with_capacity(args.count as usize);
    for i in 1..=args.count {
        match reader.acquire(config.max_wait()) {
            Ok(sample) => {
                let (feet, inches) = mm_to_feet_and_inches(f64::from(sample.distance_mm));
                println!("{:>4}  {:>5} mm  ({}' {:.1}\")", i, sample.distance_mm, feet, inches);
                readings.push(sample.distance_mm);
            }
            Err(e) if e.is_timeout() => println!("{:>4}  timeout: {}", i, e),
            Err(e) => return Err(e.into()),
        }
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    let summary = metrics.report();
    println!();
    println!(
        "chunks={} rejected={} timeouts={}",
        summary.chunks_read,
        summary.frames_rejected(),
        summary.timeouts_total
    );

    if let (Some(min), Some(max)) = (readings.iter().min(), readings.iter().max()) {
        let mean = readings.iter().map(|&mm| f64::from(mm)).sum::<f64>() / readings.len() as f64;
        println!("min={} mm max={} mm mean={:.0} mm spread={} mm", min, max, mean, max - min);
    }

    Ok(())
}
