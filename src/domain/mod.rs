//! Domain models - core measurement and event types
//!
//! This module contains the canonical data types used throughout the system:
//! - `DistanceSample` - a validated range reading
//! - `DetectionEvent` - a debounced passage with the estimated height
//! - `units` - millimetre to feet/inches conversion

pub mod types;
pub mod units;

pub use types::{DetectionEvent, DistanceSample};
