//! Range finder frame acquisition
//!
//! Protocol (MaxSonar TTL/RS232 output):
//! - ASCII frame: `R`, distance in millimetres, carriage return (`R1234\r`)
//! - Streams continuously at the sensor's own cadence
//! - Bytes arrive in arbitrarily sized chunks
//!
//! One `acquire` call opens the port, busy-polls until a valid frame shows up
//! or the deadline passes, and closes the port again. The first chunk read in
//! a call is always dropped because it may start mid-frame.

use crate::domain::types::DistanceSample;
use crate::infra::clock::Clock;
use crate::infra::metrics::Metrics;
use crate::io::serial::{ByteSource, Connector};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Leading byte of every range frame
pub const FRAME_MARKER: u8 = b'R';

/// Why a candidate chunk was not accepted as a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameRejected {
    #[error("chunk does not start with the range marker")]
    MissingMarker,
    #[error("chunk is not valid UTF-8")]
    InvalidEncoding,
    #[error("payload is not a non-negative integer")]
    NotANumber,
}

impl FrameRejected {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameRejected::MissingMarker => "missing_marker",
            FrameRejected::InvalidEncoding => "invalid_encoding",
            FrameRejected::NotANumber => "not_a_number",
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("expected serial data not received within {waited:?}")]
    Timeout { waited: Duration },
    #[error("serial port {endpoint} failed: {source}")]
    Port {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

impl AcquireError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AcquireError::Timeout { .. })
    }
}

/// Validate one chunk and extract the distance in millimetres.
///
/// The chunk must start with `R`, decode as UTF-8, and after stripping every
/// leading `R` and surrounding whitespace parse as a `u32`.
pub fn parse_frame(chunk: &[u8]) -> Result<u32, FrameRejected> {
    if chunk.first() != Some(&FRAME_MARKER) {
        return Err(FrameRejected::MissingMarker);
    }

    let text = std::str::from_utf8(chunk).map_err(|_| FrameRejected::InvalidEncoding)?;
    let digits = text.trim_start_matches(char::from(FRAME_MARKER)).trim();

    digits.parse::<u32>().map_err(|_| FrameRejected::NotANumber)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing read yet; the next chunk is dropped unseen
    Leading,
    /// Every further chunk is a frame candidate
    Candidate,
}

/// Outcome of feeding one chunk to an [`Acquisition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkVerdict {
    Discarded,
    Rejected(FrameRejected),
    Accepted(u32),
}

/// Per-call acquisition state machine
#[derive(Debug)]
pub struct Acquisition {
    phase: Phase,
    chunks: u32,
}

impl Acquisition {
    pub fn new() -> Self {
        Self { phase: Phase::Leading, chunks: 0 }
    }

    pub fn on_chunk(&mut self, chunk: &[u8]) -> ChunkVerdict {
        self.chunks += 1;

        match self.phase {
            Phase::Leading => {
                self.phase = Phase::Candidate;
                ChunkVerdict::Discarded
            }
            Phase::Candidate => match parse_frame(chunk) {
                Ok(distance_mm) => ChunkVerdict::Accepted(distance_mm),
                Err(reason) => ChunkVerdict::Rejected(reason),
            },
        }
    }

    /// Chunks seen so far, including the discarded one
    pub fn chunks(&self) -> u32 {
        self.chunks
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces one validated [`DistanceSample`] per `acquire` call
pub struct FrameReader<C, K> {
    connector: C,
    clock: K,
    metrics: Arc<Metrics>,
}

impl<C: Connector, K: Clock> FrameReader<C, K> {
    pub fn new(connector: C, clock: K, metrics: Arc<Metrics>) -> Self {
        Self { connector, clock, metrics }
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    /// Poll the sensor until a valid frame arrives or `max_wait` elapses.
    ///
    /// The port is open only for the duration of this call.
    pub fn acquire(&mut self, max_wait: Duration) -> Result<DistanceSample, AcquireError> {
        let mut source = self.connector.open().map_err(|e| self.port_error(e))?;
        self.poll_frame(&mut source, max_wait)
    }

    fn poll_frame<S: ByteSource>(
        &self,
        source: &mut S,
        max_wait: Duration,
    ) -> Result<DistanceSample, AcquireError> {
        let start = self.clock.now();
        let deadline = start + max_wait;
        let mut acquisition = Acquisition::new();

        loop {
            let now = self.clock.now();
            if now > deadline {
                self.metrics.record_timeout();
                debug!(
                    chunks = acquisition.chunks(),
                    max_wait_ms = %max_wait.as_millis(),
                    "acquire_deadline_passed"
                );
                return Err(AcquireError::Timeout { waited: now - start });
            }

            let available = source.bytes_available().map_err(|e| self.port_error(e))?;
            if available == 0 {
                self.clock.yield_now();
                continue;
            }

            let chunk = source.read_chunk(available).map_err(|e| self.port_error(e))?;
            if chunk.is_empty() {
                self.clock.yield_now();
                continue;
            }

            self.metrics.record_chunk();

            match acquisition.on_chunk(&chunk) {
                ChunkVerdict::Discarded => {
                    self.metrics.record_leading_discard();
                    trace!(len = chunk.len(), "frame_leading_chunk_discarded");
                }
                ChunkVerdict::Rejected(reason) => {
                    self.metrics.record_rejection(&reason);
                    let raw = String::from_utf8_lossy(&chunk);
                    debug!(
                        reason = reason.as_str(),
                        len = chunk.len(),
                        raw = %raw.escape_debug(),
                        "frame_rejected"
                    );
                }
                ChunkVerdict::Accepted(distance_mm) => {
                    let now = self.clock.now();
                    self.metrics.record_sample(distance_mm, now - start);
                    trace!(
                        distance_mm = %distance_mm,
                        chunks = acquisition.chunks(),
                        "frame_accepted"
                    );
                    return Ok(DistanceSample::new(distance_mm, now));
                }
            }
        }
    }

    fn port_error(&self, source: io::Error) -> AcquireError {
        AcquireError::Port { endpoint: self.connector.endpoint().to_string(), source }
    }
}
