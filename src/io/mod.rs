//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `serial` - Serial port access for the range finder
//! - `scripted` - Replayed byte source for simulation and tests
//! - `frame_reader` - Frame validation and distance acquisition
//! - `sink` - Detection event output (stdout, channel)

pub mod frame_reader;
pub mod scripted;
pub mod serial;
pub mod sink;

// Re-export commonly used types
pub use frame_reader::{AcquireError, FrameReader, FrameRejected};
pub use scripted::ScriptedConnector;
pub use serial::{ByteSource, Connector, SerialConnector};
pub use sink::{create_event_channel, forward_events, ChannelSink, EventSink, WriterSink};
