//! Counters for relay round trips: how many batches were sent, how many
//! failed or timed out, and how long they took on average.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct RelayMetrics {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    total_latency_ns: AtomicU64,
    total_timeouts: AtomicU64,
    total_images: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn record_success(&self, images: usize, latency: Duration) {
        self.record_round_trip(images, latency);
    }

    pub(crate) fn record_failure(&self, images: usize, latency: Duration) {
        self.record_round_trip(images, latency);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_round_trip(&self, images: usize, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_images.fetch_add(images as u64, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self, images: usize, latency: Duration) {
        self.record_failure(images, latency);
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RelayMetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_errors = self.total_errors.load(Ordering::Relaxed);
        let total_latency_ns = self.total_latency_ns.load(Ordering::Relaxed);

        let average_latency_ms = if total_requests == 0 {
            0.0
        } else {
            (total_latency_ns as f64 / total_requests as f64) / 1_000_000.0
        };

        RelayMetricsSnapshot {
            total_requests,
            total_errors,
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            total_images: self.total_images.load(Ordering::Relaxed),
            average_latency_ms,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RelayMetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_timeouts: u64,
    pub total_images: u64,
    pub average_latency_ms: f64,
}
