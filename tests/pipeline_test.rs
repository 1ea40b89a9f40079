//! End-to-end: scripted serial bytes through reader, detector and sink

use passage_monitor::infra::{Clock, ManualClock, Metrics};
use passage_monitor::io::{FrameReader, ScriptedConnector, WriterSink};
use passage_monitor::services::monitor::StepOutcome;
use passage_monitor::services::{Detector, DetectorConfig, Monitor, MonitorError, MonitorSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn settings() -> MonitorSettings {
    MonitorSettings {
        max_wait: Duration::from_millis(500),
        idle_delay: Duration::from_millis(100),
        max_consecutive_timeouts: 1,
        metrics_interval: None,
    }
}

/// Push one acquisition's worth of bytes: a torn lead-in chunk, optional
/// noise, then the frame itself.
fn push_reading(connector: &ScriptedConnector, mm: u32, noise: &[&[u8]]) {
    connector.push_chunk(b"23\r");
    for chunk in noise {
        connector.push_chunk(chunk);
    }
    connector.push_idle(2).push_chunk(format!("R{mm}\r").as_bytes());
}

#[test]
fn test_two_passages_with_noise() {
    let connector = ScriptedConnector::new();
    push_reading(&connector, 2400, &[]);

    // First person: 1700 mm tall, with garbage interleaved
    for mm in [2398, 700, 700, 700] {
        push_reading(&connector, mm, &[b"R\xFF\xFE", b"Rxx\r"]);
    }
    // Lingering under the sensor during cooldown
    for _ in 0..5 {
        push_reading(&connector, 700, &[]);
    }
    // Clear until the cooldown is over, then a second, shorter person
    for mm in [2400, 2401, 2400, 2399, 2400, 1200, 1200, 1200] {
        push_reading(&connector, mm, &[]);
    }

    let metrics = Arc::new(Metrics::new());
    let clock = ManualClock::new(Duration::from_millis(1));
    let reader = FrameReader::new(connector.clone(), clock, Arc::clone(&metrics));
    let mut sink = WriterSink::new(Vec::new());
    let monitor = Monitor::new(
        reader,
        Detector::new(DetectorConfig::default()),
        &mut sink,
        settings(),
        Arc::clone(&metrics),
    );

    let (_tx, rx) = watch::channel(false);
    let result = monitor.run(rx);
    assert!(matches!(result, Err(MonitorError::SensorLost(1))));

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Initial distance: 2400 mm",
            r#"{"event": "person_detected", "height_feet": 5, "height_inches": 6.9}"#,
            r#"{"event": "person_detected", "height_feet": 3, "height_inches": 11.2}"#,
        ]
    );

    let summary = metrics.report();
    assert_eq!(summary.detections_total, 2);
    assert_eq!(summary.samples_total, 18);
    assert_eq!(summary.rejected_encoding, 4);
    assert_eq!(summary.rejected_number, 4);
    assert_eq!(summary.timeouts_total, 1);
    assert!(summary.cooldown_skipped >= 5);
    assert_eq!(connector.opened(), connector.closed());
}

#[test]
fn test_step_by_step() {
    let connector = ScriptedConnector::new();
    push_reading(&connector, 1000, &[]);
    for mm in [1000, 300, 300, 300] {
        push_reading(&connector, mm, &[]);
    }

    let metrics = Arc::new(Metrics::new());
    let clock = ManualClock::new(Duration::from_millis(1));
    let reader = FrameReader::new(connector, clock.clone(), Arc::clone(&metrics));
    let mut sink = WriterSink::new(Vec::new());
    let mut monitor = Monitor::new(
        reader,
        Detector::new(DetectorConfig::default()),
        &mut sink,
        settings(),
        metrics,
    );

    let baseline = monitor.calibrate().unwrap();
    assert_eq!(baseline.distance_mm, 1000);

    let mut events = Vec::new();
    for _ in 0..4 {
        clock.sleep(Duration::from_millis(100));
        if let StepOutcome::Sample { event: Some(event), .. } = monitor.step().unwrap() {
            events.push(event);
        }
    }

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].height_feet, 2);
    assert_eq!(monitor.detector().detections(), 1);
}
