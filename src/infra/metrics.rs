//! Lock-free metrics collection and periodic reporting
//!
//! Counters are updated from the acquisition thread and read by whoever
//! calls `report()`. All atomics use Relaxed ordering; they are statistics,
//! never used for coordination.

use crate::io::frame_reader::FrameRejected;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Acquisition duration bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, >1600 ms
const ACQUIRE_BOUNDS_MS: [u64; 7] = [25, 50, 100, 200, 400, 800, 1600];
const NUM_BUCKETS: usize = 8;

/// Compute bucket index for an acquisition duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    ACQUIRE_BOUNDS_MS.partition_point(|&bound| bound < duration_ms)
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [25, 50, 100, 200, 400, 800, 1600, 3200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

pub struct Metrics {
    // Monotonic totals
    chunks_read: AtomicU64,
    leading_discarded: AtomicU64,
    rejected_marker: AtomicU64,
    rejected_encoding: AtomicU64,
    rejected_number: AtomicU64,
    samples_total: AtomicU64,
    timeouts_total: AtomicU64,
    detections_total: AtomicU64,
    cooldown_skipped: AtomicU64,
    last_distance_mm: AtomicU64,

    // Reset on every report
    samples_since_report: AtomicU64,
    acquire_buckets: [AtomicU64; NUM_BUCKETS],
    acquire_max_ms: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            chunks_read: AtomicU64::new(0),
            leading_discarded: AtomicU64::new(0),
            rejected_marker: AtomicU64::new(0),
            rejected_encoding: AtomicU64::new(0),
            rejected_number: AtomicU64::new(0),
            samples_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            detections_total: AtomicU64::new(0),
            cooldown_skipped: AtomicU64::new(0),
            last_distance_mm: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            acquire_buckets: Default::default(),
            acquire_max_ms: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_chunk(&self) {
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_leading_discard(&self) {
        self.leading_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejection(&self, reason: &FrameRejected) {
        let counter = match reason {
            FrameRejected::MissingMarker => &self.rejected_marker,
            FrameRejected::InvalidEncoding => &self.rejected_encoding,
            FrameRejected::NotANumber => &self.rejected_number,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful acquisition and how long it took
    pub fn record_sample(&self, distance_mm: u32, took: Duration) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        self.last_distance_mm.store(u64::from(distance_mm), Ordering::Relaxed);

        let took_ms = took.as_millis() as u64;
        self.acquire_buckets[bucket_index(took_ms)].fetch_add(1, Ordering::Relaxed);
        self.acquire_max_ms.fetch_max(took_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_detection(&self) {
        self.detections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cooldown_skip(&self) {
        self.cooldown_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    pub fn timeouts_total(&self) -> u64 {
        self.timeouts_total.load(Ordering::Relaxed)
    }

    pub fn detections_total(&self) -> u64 {
        self.detections_total.load(Ordering::Relaxed)
    }

    /// Snapshot totals and drain the per-interval counters, timing the
    /// interval against the wall clock
    pub fn report(&self) -> MetricsSummary {
        self.report_at(Instant::now())
    }

    /// Start the rate interval at `now`, for callers on an injected clock
    pub fn mark_report_start(&self, now: Instant) {
        *self.last_report_time.lock() = now;
    }

    /// Like [`Metrics::report`], with `now` taken from the caller's clock
    pub fn report_at(&self, now: Instant) -> MetricsSummary {
        let samples = self.samples_since_report.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.acquire_buckets);
        let acquire_max_ms = self.acquire_max_ms.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };

        let samples_per_sec = if elapsed.as_secs_f64() > 0.0 {
            samples as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            leading_discarded: self.leading_discarded.load(Ordering::Relaxed),
            rejected_marker: self.rejected_marker.load(Ordering::Relaxed),
            rejected_encoding: self.rejected_encoding.load(Ordering::Relaxed),
            rejected_number: self.rejected_number.load(Ordering::Relaxed),
            samples_total: self.samples_total(),
            timeouts_total: self.timeouts_total(),
            detections_total: self.detections_total(),
            cooldown_skipped: self.cooldown_skipped.load(Ordering::Relaxed),
            last_distance_mm: self.last_distance_mm.load(Ordering::Relaxed),
            samples_per_sec,
            acquire_buckets: buckets,
            acquire_p50_ms: percentile_from_buckets(&buckets, 0.50),
            acquire_p99_ms: percentile_from_buckets(&buckets, 0.99),
            acquire_max_ms,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub chunks_read: u64,
    pub leading_discarded: u64,
    pub rejected_marker: u64,
    pub rejected_encoding: u64,
    pub rejected_number: u64,
    pub samples_total: u64,
    pub timeouts_total: u64,
    pub detections_total: u64,
    pub cooldown_skipped: u64,
    pub last_distance_mm: u64,
    pub samples_per_sec: f64,
    /// Bounds: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, >1600 ms
    pub acquire_buckets: [u64; NUM_BUCKETS],
    pub acquire_p50_ms: u64,
    pub acquire_p99_ms: u64,
    pub acquire_max_ms: u64,
}

impl MetricsSummary {
    pub fn frames_rejected(&self) -> u64 {
        self.rejected_marker + self.rejected_encoding + self.rejected_number
    }

    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_sec = format!("{:.1}", self.samples_per_sec),
            chunks = %self.chunks_read,
            rejected = %self.frames_rejected(),
            timeouts = %self.timeouts_total,
            detections = %self.detections_total,
            last_distance_mm = %self.last_distance_mm,
            acquire_p50_ms = %self.acquire_p50_ms,
            acquire_p99_ms = %self.acquire_p99_ms,
            acquire_max_ms = %self.acquire_max_ms,
            "metrics"
        );
    }
}
