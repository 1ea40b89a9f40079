//! Shared types for the passage monitor

use crate::domain::units::mm_to_feet_and_inches;
use serde::{Serialize, Serializer};
use std::io;
use std::time::Instant;

/// A validated range reading.
///
/// Only the frame reader constructs these, and only after the frame passed
/// marker, encoding and numeric checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceSample {
    pub distance_mm: u32,
    pub timestamp: Instant,
}

impl DistanceSample {
    #[inline]
    pub fn new(distance_mm: u32, timestamp: Instant) -> Self {
        Self { distance_mm, timestamp }
    }
}

/// A debounced passage through the monitored zone.
///
/// Serializes as `{"event": "person_detected", "height_feet": 2, "height_inches": 3.6}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename = "person_detected")]
pub struct DetectionEvent {
    pub height_feet: u32,
    #[serde(serialize_with = "one_decimal")]
    pub height_inches: f64,
}

impl DetectionEvent {
    /// Build an event from the height of the object above the floor
    pub fn from_height_mm(height_mm: f64) -> Self {
        let (height_feet, height_inches) = mm_to_feet_and_inches(height_mm);
        Self { height_feet, height_inches }
    }

    /// Render the single-line record consumers parse.
    pub fn to_json_line(&self) -> io::Result<String> {
        let mut buf = Vec::with_capacity(80);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        self.serialize(&mut ser).map_err(io::Error::from)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn one_decimal<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64((value * 10.0).round() / 10.0)
}

/// Compact JSON with a space after every `,` and `:` between object members.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line_format() {
        let event = DetectionEvent { height_feet: 2, height_inches: 3.559 };
        assert_eq!(
            event.to_json_line().unwrap(),
            r#"{"event": "person_detected", "height_feet": 2, "height_inches": 3.6}"#
        );
    }

    #[test]
    fn test_json_line_whole_inches() {
        let event = DetectionEvent { height_feet: 5, height_inches: 0.0 };
        assert_eq!(
            event.to_json_line().unwrap(),
            r#"{"event": "person_detected", "height_feet": 5, "height_inches": 0.0}"#
        );
    }

    #[test]
    fn test_json_line_is_valid_json() {
        let event = DetectionEvent::from_height_mm(1700.0);
        let line = event.to_json_line().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "person_detected");
        assert_eq!(parsed["height_feet"], 5);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_event_from_height() {
        let event = DetectionEvent::from_height_mm(700.0);
        assert_eq!(event.height_feet, 2);
        assert!((event.height_inches - 3.5590551).abs() < 1e-6);
    }
}
