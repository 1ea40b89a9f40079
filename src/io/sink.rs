//! Event sinks - where detections go
//!
//! Output is line oriented:
//! - `Initial distance: <mm> mm` once, when the baseline is taken
//! - one JSON object per detection
//!
//! `ChannelSink` lets the blocking acquisition thread hand records to an
//! async writer task without touching stdout itself.

use crate::domain::types::{DetectionEvent, DistanceSample};
use std::io::{self, Stdout, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub trait EventSink {
    /// Called once, after the baseline sample is captured
    fn baseline_established(&mut self, _sample: &DistanceSample) -> io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, event: &DetectionEvent) -> io::Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn baseline_established(&mut self, sample: &DistanceSample) -> io::Result<()> {
        (**self).baseline_established(sample)
    }

    fn emit(&mut self, event: &DetectionEvent) -> io::Result<()> {
        (**self).emit(event)
    }
}

/// Writes records as text lines, flushing after each one
pub struct WriterSink<W: Write> {
    writer: W,
}

impl WriterSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for WriterSink<W> {
    fn baseline_established(&mut self, sample: &DistanceSample) -> io::Result<()> {
        writeln!(self.writer, "Initial distance: {} mm", sample.distance_mm)?;
        self.writer.flush()
    }

    fn emit(&mut self, event: &DetectionEvent) -> io::Result<()> {
        let line = event.to_json_line()?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}

/// Record passed from the acquisition thread to the writer task
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Baseline(DistanceSample),
    Detection(DetectionEvent),
}

/// Forwards records over a bounded channel.
///
/// Uses `blocking_send`, so it must be driven from a blocking thread, never
/// from inside an async task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkMessage>,
}

impl ChannelSink {
    fn send(&self, message: SinkMessage) -> io::Result<()> {
        self.tx
            .blocking_send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event channel closed"))
    }
}

impl EventSink for ChannelSink {
    fn baseline_established(&mut self, sample: &DistanceSample) -> io::Result<()> {
        self.send(SinkMessage::Baseline(*sample))
    }

    fn emit(&mut self, event: &DetectionEvent) -> io::Result<()> {
        self.send(SinkMessage::Detection(*event))
    }
}

/// Create a bounded event channel
pub fn create_event_channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<SinkMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink { tx }, rx)
}

/// Drain the channel into `sink` until every sender is gone.
///
/// Returns the number of detections written.
pub async fn forward_events<S: EventSink>(
    mut rx: mpsc::Receiver<SinkMessage>,
    mut sink: S,
) -> io::Result<u64> {
    let mut detections = 0u64;

    while let Some(message) = rx.recv().await {
        let result = match &message {
            SinkMessage::Baseline(sample) => sink.baseline_established(sample),
            SinkMessage::Detection(event) => {
                detections += 1;
                sink.emit(event)
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "event_sink_write_failed");
            return Err(e);
        }
    }

    debug!(detections = %detections, "event_forwarder_finished");
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_writer_sink_output() {
        let mut sink = WriterSink::new(Vec::new());
        sink.baseline_established(&DistanceSample::new(1000, Instant::now())).unwrap();
        sink.emit(&DetectionEvent { height_feet: 2, height_inches: 3.559 }).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "Initial distance: 1000 mm\n\
             {\"event\": \"person_detected\", \"height_feet\": 2, \"height_inches\": 3.6}\n"
        );
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, rx) = create_event_channel(8);

        let producer = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            sink.baseline_established(&DistanceSample::new(2400, Instant::now())).unwrap();
            sink.emit(&DetectionEvent { height_feet: 5, height_inches: 9.0 }).unwrap();
            sink.emit(&DetectionEvent { height_feet: 6, height_inches: 1.2 }).unwrap();
        });

        let mut out = WriterSink::new(Vec::new());
        let (written, produced) = tokio::join!(forward_events(rx, &mut out), producer);
        produced.unwrap();
        assert_eq!(written.unwrap(), 2);

        let output = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Initial distance: 2400 mm",
                r#"{"event": "person_detected", "height_feet": 5, "height_inches": 9.0}"#,
                r#"{"event": "person_detected", "height_feet": 6, "height_inches": 1.2}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver() {
        let (sink, rx) = create_event_channel(1);
        drop(rx);

        let result = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            sink.emit(&DetectionEvent { height_feet: 1, height_inches: 0.0 })
        })
        .await
        .unwrap();

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }
}
