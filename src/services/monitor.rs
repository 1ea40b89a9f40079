//! Acquisition loop: calibrate, then read → detect → emit until told to stop
//!
//! Timeout policy:
//! - no baseline reading within `max_wait` is fatal
//! - later timeouts are logged and retried; detector state is kept
//! - `max_consecutive_timeouts` timeouts in a row (if non-zero) is fatal
//! - serial port errors are always fatal

use crate::domain::types::{DetectionEvent, DistanceSample};
use crate::infra::clock::Clock;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::frame_reader::{AcquireError, FrameReader};
use crate::io::serial::Connector;
use crate::io::sink::EventSink;
use crate::services::detector::{Detector, DetectorError};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("could not establish baseline: {0}")]
    Baseline(#[source] AcquireError),
    #[error("sensor lost after {0} consecutive acquisition timeouts")]
    SensorLost(u32),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("event sink failed: {0}")]
    Sink(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub max_wait: Duration,
    pub idle_delay: Duration,
    /// 0 disables the limit
    pub max_consecutive_timeouts: u32,
    /// `None` disables the periodic metrics summary
    pub metrics_interval: Option<Duration>,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        let metrics_interval = match config.metrics_interval_secs() {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            max_wait: config.max_wait(),
            idle_delay: config.idle_delay(),
            max_consecutive_timeouts: config.max_consecutive_timeouts(),
            metrics_interval,
        }
    }
}

/// Result of one acquisition round
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Sample { sample: DistanceSample, event: Option<DetectionEvent> },
    Timeout,
}

pub struct Monitor<C, K, S> {
    reader: FrameReader<C, K>,
    detector: Detector,
    sink: S,
    settings: MonitorSettings,
    metrics: Arc<Metrics>,
    consecutive_timeouts: u32,
    last_report: Option<Instant>,
}

impl<C: Connector, K: Clock, S: EventSink> Monitor<C, K, S> {
    pub fn new(
        reader: FrameReader<C, K>,
        detector: Detector,
        sink: S,
        settings: MonitorSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            reader,
            detector,
            sink,
            settings,
            metrics,
            consecutive_timeouts: 0,
            last_report: None,
        }
    }

    /// Take the baseline reading and announce it to the sink
    pub fn calibrate(&mut self) -> Result<DistanceSample, MonitorError> {
        let sample = self.reader.acquire(self.settings.max_wait).map_err(|e| {
            error!(endpoint = %self.reader.endpoint(), error = %e, "baseline_acquire_failed");
            MonitorError::Baseline(e)
        })?;

        self.detector.establish_baseline(sample)?;
        self.sink.baseline_established(&sample)?;
        Ok(sample)
    }

    /// One acquisition, fed through the detector
    pub fn step(&mut self) -> Result<StepOutcome, MonitorError> {
        let sample = match self.reader.acquire(self.settings.max_wait) {
            Ok(sample) => sample,
            Err(AcquireError::Timeout { waited }) => return self.on_timeout(waited),
            Err(e) => {
                error!(error = %e, "acquire_failed");
                return Err(e.into());
            }
        };

        if self.consecutive_timeouts > 0 {
            info!(after_timeouts = %self.consecutive_timeouts, "sensor_recovered");
            self.consecutive_timeouts = 0;
        }

        if self.detector.in_cooldown(sample.timestamp) {
            self.metrics.record_cooldown_skip();
        }

        let event = self.detector.observe(sample);
        if let Some(ref event) = event {
            self.metrics.record_detection();
            self.sink.emit(event)?;
        }

        Ok(StepOutcome::Sample { sample, event })
    }

    fn on_timeout(&mut self, waited: Duration) -> Result<StepOutcome, MonitorError> {
        self.consecutive_timeouts += 1;
        warn!(
            waited_ms = %waited.as_millis(),
            consecutive = %self.consecutive_timeouts,
            "acquire_timeout"
        );

        let limit = self.settings.max_consecutive_timeouts;
        if limit > 0 && self.consecutive_timeouts >= limit {
            error!(consecutive = %self.consecutive_timeouts, "sensor_lost");
            return Err(MonitorError::SensorLost(self.consecutive_timeouts));
        }

        Ok(StepOutcome::Timeout)
    }

    fn maybe_report(&mut self) {
        let Some(interval) = self.settings.metrics_interval else {
            return;
        };

        let now = self.reader.clock().now();
        match self.last_report {
            Some(last) if now.duration_since(last) < interval => {}
            Some(_) => {
                self.metrics.report_at(now).log();
                self.last_report = Some(now);
            }
            None => {
                self.metrics.mark_report_start(now);
                self.last_report = Some(now);
            }
        }
    }

    /// Calibrate, then loop until `shutdown` flips to true.
    ///
    /// Returns the number of detections made.
    pub fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<u64, MonitorError> {
        info!(
            endpoint = %self.reader.endpoint(),
            max_wait_ms = %self.settings.max_wait.as_millis(),
            idle_delay_ms = %self.settings.idle_delay.as_millis(),
            "monitor_started"
        );

        let baseline = self.calibrate()?;
        info!(baseline_mm = %baseline.distance_mm, "monitor_armed");

        while !*shutdown.borrow() {
            self.step()?;
            self.maybe_report();
            self.reader.clock().sleep(self.settings.idle_delay);
        }

        info!(detections = %self.detector.detections(), "monitor_shutdown");
        Ok(self.detector.detections())
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::clock::ManualClock;
    use crate::io::scripted::ScriptedConnector;
    use crate::io::sink::WriterSink;
    use crate::services::detector::DetectorConfig;

    type TestMonitor<'a> = Monitor<ScriptedConnector, ManualClock, &'a mut WriterSink<Vec<u8>>>;

    fn settings(max_consecutive_timeouts: u32) -> MonitorSettings {
        MonitorSettings {
            max_wait: Duration::from_millis(200),
            idle_delay: Duration::from_millis(100),
            max_consecutive_timeouts,
            metrics_interval: Some(Duration::from_secs(1)),
        }
    }

    /// Every acquisition drops its first chunk, so each reading needs a lead-in
    fn push_reading(connector: &ScriptedConnector, mm: u32) {
        connector.push_chunk(b"0\r").push_chunk(format!("R{mm}\r").as_bytes());
    }

    fn monitor<'a>(
        connector: &ScriptedConnector,
        sink: &'a mut WriterSink<Vec<u8>>,
        max_consecutive_timeouts: u32,
    ) -> TestMonitor<'a> {
        let metrics = Arc::new(Metrics::new());
        let reader = FrameReader::new(
            connector.clone(),
            ManualClock::new(Duration::from_millis(1)),
            Arc::clone(&metrics),
        );
        Monitor::new(
            reader,
            Detector::new(DetectorConfig::default()),
            sink,
            settings(max_consecutive_timeouts),
            metrics,
        )
    }

    #[test]
    fn test_run_emits_one_event() {
        let connector = ScriptedConnector::new();
        for mm in [1000, 1000, 1000, 300, 300, 300] {
            push_reading(&connector, mm);
        }

        let mut sink = WriterSink::new(Vec::new());
        let (_tx, rx) = watch::channel(false);
        let result = monitor(&connector, &mut sink, 2).run(rx);

        assert!(matches!(result, Err(MonitorError::SensorLost(2))));
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "Initial distance: 1000 mm\n\
             {\"event\": \"person_detected\", \"height_feet\": 2, \"height_inches\": 3.6}\n"
        );
    }

    #[test]
    fn test_baseline_timeout_is_fatal() {
        let connector = ScriptedConnector::new();
        let mut sink = WriterSink::new(Vec::new());
        let (_tx, rx) = watch::channel(false);

        let result = monitor(&connector, &mut sink, 0).run(rx);

        match result {
            Err(MonitorError::Baseline(e)) => assert!(e.is_timeout()),
            other => panic!("expected baseline failure, got {other:?}"),
        }
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn test_steady_state_timeout_is_retried() {
        let connector = ScriptedConnector::new();
        push_reading(&connector, 1000);

        let mut sink = WriterSink::new(Vec::new());
        let mut monitor = monitor(&connector, &mut sink, 0);
        monitor.calibrate().unwrap();

        assert_eq!(monitor.step().unwrap(), StepOutcome::Timeout);
        assert_eq!(monitor.step().unwrap(), StepOutcome::Timeout);
        assert_eq!(monitor.consecutive_timeouts(), 2);

        push_reading(&connector, 990);
        match monitor.step().unwrap() {
            StepOutcome::Sample { sample, event } => {
                assert_eq!(sample.distance_mm, 990);
                assert!(event.is_none());
            }
            StepOutcome::Timeout => panic!("expected a sample"),
        }
        assert_eq!(monitor.consecutive_timeouts(), 0);
    }

    #[test]
    fn test_timeout_keeps_detector_progress() {
        let connector = ScriptedConnector::new();
        push_reading(&connector, 1000);
        push_reading(&connector, 300);
        push_reading(&connector, 300);

        let mut sink = WriterSink::new(Vec::new());
        let mut monitor = monitor(&connector, &mut sink, 0);
        monitor.calibrate().unwrap();
        monitor.step().unwrap();
        monitor.step().unwrap();
        assert_eq!(monitor.step().unwrap(), StepOutcome::Timeout);
        assert_eq!(monitor.detector().consecutive_below(), 2);

        push_reading(&connector, 300);
        assert!(matches!(
            monitor.step().unwrap(),
            StepOutcome::Sample { event: Some(_), .. }
        ));
    }

    #[test]
    fn test_shutdown_before_loop() {
        let connector = ScriptedConnector::new();
        push_reading(&connector, 1500);

        let mut sink = WriterSink::new(Vec::new());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let detections = monitor(&connector, &mut sink, 0).run(rx).unwrap();
        assert_eq!(detections, 0);
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "Initial distance: 1500 mm\n");
    }

    #[test]
    fn test_port_error_is_fatal() {
        let connector = ScriptedConnector::new();
        push_reading(&connector, 1000);

        let mut sink = WriterSink::new(Vec::new());
        let mut monitor = monitor(&connector, &mut sink, 0);
        monitor.calibrate().unwrap();

        connector.fail_open(io::ErrorKind::NotFound);
        assert!(matches!(
            monitor.step(),
            Err(MonitorError::Acquire(AcquireError::Port { .. }))
        ));
    }

    #[test]
    fn test_calibrate_twice_fails() {
        let connector = ScriptedConnector::new();
        push_reading(&connector, 1000);
        push_reading(&connector, 1000);

        let mut sink = WriterSink::new(Vec::new());
        let mut monitor = monitor(&connector, &mut sink, 0);
        monitor.calibrate().unwrap();
        assert!(matches!(monitor.calibrate(), Err(MonitorError::Detector(_))));
    }
}
