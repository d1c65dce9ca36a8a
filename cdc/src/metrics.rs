//! Per-pipeline metrics.
//!
//! Counters are atomics written only by the owning pipeline worker and read
//! from any thread. The processing rate is computed over a sliding window of
//! recent publish timestamps guarded by a short-held lock that is never held
//! across I/O.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Width of the sliding window used for the processing rate.
const RATE_WINDOW: Duration = Duration::from_secs(10);

/// Serializable snapshot of a pipeline's metrics, handed to the operator
/// surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Events successfully published to the broker.
    pub events_processed: u64,
    /// Events that exhausted their retries.
    pub events_failed: u64,
    /// Events dropped by the transformation chain.
    pub events_filtered: u64,
    /// Successful publishes per second over the sliding window.
    pub processing_rate: f64,
    /// Capture-to-publish latency of the most recent event, in milliseconds.
    pub latency_ms: f64,
}

/// Live metrics block owned by one pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_processed: AtomicU64,
    events_failed: AtomicU64,
    events_filtered: AtomicU64,
    latency_us: AtomicU64,
    window: Mutex<VecDeque<Instant>>,
}

impl PipelineMetrics {
    /// Creates a zeroed metrics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successfully published event with its capture-to-publish
    /// latency.
    pub fn record_processed(&self, latency: Duration) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        self.latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);

        let now = Instant::now();
        let mut window = self.window.lock().unwrap();
        window.push_back(now);
        prune_window(&mut window, now);
    }

    /// Records one event that exhausted its retries.
    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one event dropped by the transformation chain.
    pub fn record_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a consistent-enough snapshot for the operator surface.
    ///
    /// Counters are read individually; a snapshot taken concurrently with the
    /// worker may be off by the event currently in flight, which is fine for
    /// monitoring.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let rate = {
            let mut window = self.window.lock().unwrap();
            prune_window(&mut window, now);
            window.len() as f64 / RATE_WINDOW.as_secs_f64()
        };

        MetricsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            processing_rate: rate,
            latency_ms: self.latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if now.duration_since(*oldest) > RATE_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
