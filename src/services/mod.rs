//! Services - detection logic and the acquisition loop
//!
//! This module contains the core business logic services:
//! - `detector` - Baseline, debounce and cooldown over distance samples
//! - `monitor` - Drives acquisition, detection and event output

pub mod detector;
pub mod monitor;

// Re-export commonly used types
pub use detector::{Detector, DetectorConfig};
pub use monitor::{Monitor, MonitorError, MonitorSettings};
