//! Time source abstraction
//!
//! Acquisition deadlines, cooldowns and the idle delay between readings all go
//! through a [`Clock`] so the pipeline can run against simulated time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Give up the CPU briefly while busy-polling.
    fn yield_now(&self);

    fn sleep(&self, duration: Duration);
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Simulated time that only moves when polled or slept on.
///
/// Every `yield_now` advances by a fixed tick; `sleep` advances by the
/// requested duration. Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
    tick: Duration,
}

impl ManualClock {
    pub fn new(tick: Duration) -> Self {
        Self { now: Arc::new(Mutex::new(Instant::now())), tick }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn yield_now(&self) {
        self.advance(self.tick);
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
