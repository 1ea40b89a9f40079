//! Passage detection over a stream of distance samples
//!
//! A sensor mounted above the doorway reads the floor distance when the zone
//! is clear. Anything passing underneath shortens the reading. A passage is
//! declared when:
//! - the reading is below `baseline - safety_margin`
//! - for `required_consecutive` samples in a row
//!
//! After firing, samples are ignored until the cooldown has elapsed so one
//! person lingering near the threshold produces one event.

use crate::domain::types::{DetectionEvent, DistanceSample};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub safety_margin_mm: f64,
    pub required_consecutive: u32,
    pub cooldown: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            safety_margin_mm: 609.6, // 2 ft
            required_consecutive: 3,
            cooldown: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DetectorError {
    #[error("baseline already established at {0} mm")]
    AlreadyEstablished(u32),
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    distance_mm: u32,
    threshold_mm: f64,
}

#[derive(Debug, Default)]
struct DetectionState {
    consecutive_below: u32,
    cooldown_until: Option<Instant>,
    /// Set after a detection until a clear reading is seen again
    occupied: bool,
}

pub struct Detector {
    config: DetectorConfig,
    baseline: Option<Baseline>,
    state: DetectionState,
    detections: u64,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config, baseline: None, state: DetectionState::default(), detections: 0 }
    }

    /// Fix the clear-zone distance. Returns the detection threshold in mm.
    pub fn establish_baseline(&mut self, sample: DistanceSample) -> Result<f64, DetectorError> {
        if let Some(existing) = self.baseline {
            return Err(DetectorError::AlreadyEstablished(existing.distance_mm));
        }

        let threshold_mm = f64::from(sample.distance_mm) - self.config.safety_margin_mm;
        if threshold_mm <= 0.0 {
            warn!(
                baseline_mm = %sample.distance_mm,
                safety_margin_mm = %self.config.safety_margin_mm,
                "baseline_within_safety_margin"
            );
        }

        info!(
            baseline_mm = %sample.distance_mm,
            threshold_mm = format!("{:.1}", threshold_mm),
            required_consecutive = %self.config.required_consecutive,
            cooldown_ms = %self.config.cooldown.as_millis(),
            "baseline_established"
        );

        self.baseline = Some(Baseline { distance_mm: sample.distance_mm, threshold_mm });
        Ok(threshold_mm)
    }

    /// Feed one sample. Returns an event when a debounced passage completes.
    pub fn observe(&mut self, sample: DistanceSample) -> Option<DetectionEvent> {
        let Some(baseline) = self.baseline else {
            debug!(distance_mm = %sample.distance_mm, "detector_no_baseline");
            return None;
        };

        if let Some(until) = self.state.cooldown_until {
            if sample.timestamp < until {
                trace!(distance_mm = %sample.distance_mm, "detector_cooldown_skip");
                return None;
            }
            self.state.cooldown_until = None;
            debug!("detector_armed");
        }

        if f64::from(sample.distance_mm) >= baseline.threshold_mm {
            if self.state.occupied {
                self.state.occupied = false;
                debug!(distance_mm = %sample.distance_mm, "zone_cleared");
            }
            self.state.consecutive_below = 0;
            return None;
        }

        self.state.consecutive_below += 1;
        trace!(
            distance_mm = %sample.distance_mm,
            consecutive_below = %self.state.consecutive_below,
            "detector_below_threshold"
        );

        if self.state.consecutive_below < self.config.required_consecutive {
            return None;
        }

        let height_mm = f64::from(baseline.distance_mm) - f64::from(sample.distance_mm);
        let event = DetectionEvent::from_height_mm(height_mm);

        self.detections += 1;
        self.state.consecutive_below = 0;
        self.state.occupied = true;
        self.state.cooldown_until = Some(sample.timestamp + self.config.cooldown);

        info!(
            distance_mm = %sample.distance_mm,
            height_mm = format!("{:.0}", height_mm),
            height_feet = %event.height_feet,
            height_inches = format!("{:.1}", event.height_inches),
            total_detections = %self.detections,
            "person_detected"
        );

        Some(event)
    }

    /// True if a sample taken at `at` would be ignored by the cooldown
    pub fn in_cooldown(&self, at: Instant) -> bool {
        self.state.cooldown_until.is_some_and(|until| at < until)
    }

    pub fn baseline_mm(&self) -> Option<u32> {
        self.baseline.map(|b| b.distance_mm)
    }

    pub fn threshold_mm(&self) -> Option<f64> {
        self.baseline.map(|b| b.threshold_mm)
    }

    pub fn consecutive_below(&self) -> u32 {
        self.state.consecutive_below
    }

    /// Detections since startup
    pub fn detections(&self) -> u64 {
        self.detections
    }
}
