//! Metrics-sink contract and the in-process recorder behind it.
//!
//! The engine emits timers and counters through [`MetricsSink`]; emission is
//! fire-and-forget and must never block or fail back into the caller.
//! [`RecordingMetrics`] is the in-process implementation: bucketed latency
//! histograms and counters on atomics, snapshotted into serializable form.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Metric names emitted by the engine.
pub mod name {
    pub const APPLY_CREATE: &str = "engine.apply.create";
    pub const APPLY_APPEND: &str = "engine.apply.append";
    pub const CONFLICT_RETRY: &str = "engine.conflict.retry";
    pub const CONFLICT_EXHAUSTED: &str = "engine.conflict.exhausted";
    pub const TIMEOUT: &str = "engine.timeout";
    pub const STORE_ERROR: &str = "engine.store.error";
    pub const CIRCUIT_REJECTED: &str = "engine.circuit.rejected";
}

pub trait MetricsSink: Send + Sync + 'static {
    fn record_timer(&self, name: &'static str, duration: Duration);
    fn increment_counter(&self, name: &'static str);
}

/// Sink that drops everything.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_timer(&self, _name: &'static str, _duration: Duration) {}
    fn increment_counter(&self, _name: &'static str) {}
}

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_US: [u64; LATENCY_BUCKET_COUNT] = [
    10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000,
];

#[derive(Default)]
struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl LatencyHistogram {
    fn record(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.update_max(us);

        if let Some((idx, _)) = LATENCY_BUCKETS_US
            .iter()
            .enumerate()
            .find(|(_, bucket)| us <= **bucket)
        {
            self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        } else {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn update_max(&self, value: u64) {
        let mut current = self.max_us.load(Ordering::Relaxed);
        while value > current {
            match self.max_us.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => current = next,
            }
        }
    }

    fn snapshot(&self) -> TimerSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_us.load(Ordering::Relaxed);
        let avg_us = if count > 0 {
            total_us as f64 / count as f64
        } else {
            0.0
        };
        TimerSnapshot {
            buckets_us: LATENCY_BUCKETS_US.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_us,
            max_us: self.max_us.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TimerSnapshot {
    pub buckets_us: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_us: f64,
    pub max_us: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timers: BTreeMap<String, TimerSnapshot>,
    pub counters: BTreeMap<String, u64>,
}

/// Atomics-backed sink; cheap enough to sit on the engine's hot path.
#[derive(Default)]
pub struct RecordingMetrics {
    timers: Mutex<HashMap<&'static str, Arc<LatencyHistogram>>>,
    counters: Mutex<HashMap<&'static str, Arc<AtomicU64>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timers = self
            .timers
            .lock()
            .unwrap()
            .iter()
            .map(|(name, histogram)| (name.to_string(), histogram.snapshot()))
            .collect();
        let counters = self
            .counters
            .lock()
            .unwrap()
            .iter()
            .map(|(name, counter)| (name.to_string(), counter.load(Ordering::Relaxed)))
            .collect();
        MetricsSnapshot { timers, counters }
    }

    pub fn counter(&self, name: &'static str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn histogram(&self, name: &'static str) -> Arc<LatencyHistogram> {
        let mut timers = self.timers.lock().unwrap();
        Arc::clone(timers.entry(name).or_default())
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_timer(&self, name: &'static str, duration: Duration) {
        // Lock only to resolve the histogram; recording is atomic.
        self.histogram(name).record(duration);
    }

    fn increment_counter(&self, name: &'static str) {
        let counter = {
            let mut counters = self.counters.lock().unwrap();
            Arc::clone(counters.entry(name).or_default())
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
