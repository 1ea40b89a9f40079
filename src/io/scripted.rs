//! Scripted byte source for simulation and tests
//!
//! Replays a queue of polls: each entry is either a chunk that becomes
//! available on the next poll, or an idle poll with nothing buffered.
//! The queue outlives individual connections, like bytes sitting in a UART.

use crate::io::serial::{ByteSource, Connector};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Poll {
    Idle,
    Chunk(Vec<u8>),
}

#[derive(Debug, Default)]
struct Shared {
    script: Mutex<VecDeque<Poll>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    fail_open: Mutex<Option<io::ErrorKind>>,
}

/// Connector that replays queued chunks. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk that will be reported on the next non-idle poll
    pub fn push_chunk(&self, bytes: &[u8]) -> &Self {
        self.shared.script.lock().push_back(Poll::Chunk(bytes.to_vec()));
        self
    }

    /// Queue `count` polls that find nothing buffered
    pub fn push_idle(&self, count: usize) -> &Self {
        let mut script = self.shared.script.lock();
        script.extend(std::iter::repeat(Poll::Idle).take(count));
        self
    }

    /// Make every subsequent `open` fail
    pub fn fail_open(&self, kind: io::ErrorKind) {
        *self.shared.fail_open.lock() = Some(kind);
    }

    pub fn remaining(&self) -> usize {
        self.shared.script.lock().len()
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::Relaxed)
    }
}

impl Connector for ScriptedConnector {
    type Source = ScriptedSource;

    fn open(&mut self) -> io::Result<ScriptedSource> {
        if let Some(kind) = *self.shared.fail_open.lock() {
            return Err(io::Error::new(kind, "scripted open failure"));
        }
        self.shared.opened.fetch_add(1, Ordering::Relaxed);
        Ok(ScriptedSource { shared: Arc::clone(&self.shared) })
    }

    fn endpoint(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedSource {
    shared: Arc<Shared>,
}

impl ByteSource for ScriptedSource {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut script = self.shared.script.lock();
        match script.front() {
            Some(Poll::Idle) => {
                script.pop_front();
                Ok(0)
            }
            Some(Poll::Chunk(bytes)) => Ok(bytes.len()),
            None => Ok(0),
        }
    }

    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut script = self.shared.script.lock();
        let Some(Poll::Chunk(bytes)) = script.front_mut() else {
            return Ok(Vec::new());
        };
        if bytes.len() > max {
            return Ok(bytes.drain(..max).collect());
        }
        match script.pop_front() {
            Some(Poll::Chunk(bytes)) => Ok(bytes),
            _ => Ok(Vec::new()),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.shared.closed.fetch_add(1, Ordering::Relaxed);
    }
}
