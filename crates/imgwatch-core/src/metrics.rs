//! Request metrics for the imgwatch daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Atomic counters for request handling.
pub struct Metrics {
    /// Total number of requests processed
    pub requests_total: AtomicU64,
    /// Requests answered with an error response
    pub requests_failed: AtomicU64,
    /// Sum of all request latencies in microseconds
    pub requests_latency_us: AtomicU64,
    /// Daemon start time
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_latency_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request.
    pub fn record_request(&self, latency: Duration, failed: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if failed {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total requests recorded so far.
    pub fn total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests that ended in an error response.
    pub fn failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get average request latency.
    pub fn avg_latency(&self) -> Duration {
        let total = self.requests_total.load(Ordering::Relaxed);
        let latency_us = self.requests_latency_us.load(Ordering::Relaxed);
        if total == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(latency_us / total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_request_recording() {
        let metrics = Metrics::new();
        metrics.record_request(Duration::from_millis(10), false);
        metrics.record_request(Duration::from_millis(20), true);

        assert_eq!(metrics.total(), 2);
        assert_eq!(metrics.failed(), 1);
        assert_eq!(metrics.avg_latency(), Duration::from_millis(15));
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = Metrics::default();
        assert_eq!(metrics.total(), 0);
        assert_eq!(metrics.avg_latency(), Duration::ZERO);
        assert_eq!(metrics.uptime_secs(), 0);
    }
}
