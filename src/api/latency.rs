//! In-memory latency histogram for draw executions.
//! Records wall time from request accepted to draw committed.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::config::{LATENCY_MAX_US, LATENCY_MIN_US};

/// Shared latency stats. Draw handler records, API reads.
/// Values stored in microseconds.
pub struct DrawLatency {
    inner: Mutex<Histogram<u64>>,
}

impl DrawLatency {
    /// Tracks LATENCY_MIN_US to LATENCY_MAX_US at 3 significant figures.
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(LATENCY_MIN_US, LATENCY_MAX_US, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    /// Values above the upper bound are clamped.
    pub fn record_us(&self, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us.clamp(LATENCY_MIN_US, LATENCY_MAX_US));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    /// Return (p50_us, p95_us, p99_us). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        let p50 = h.value_at_quantile(0.5);
        let p95 = h.value_at_quantile(0.95);
        let p99 = h.value_at_quantile(0.99);
        (Some(p50), Some(p95), Some(p99))
    }

    /// Sample count.
    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DrawLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let latency = DrawLatency::new();
        assert!(latency.is_empty());
        assert_eq!(latency.percentiles(), (None, None, None));
    }

    #[test]
    fn percentiles_follow_recorded_durations() {
        let latency = DrawLatency::new();
        for ms in 1..=100u64 {
            latency.record(Duration::from_millis(ms));
        }
        assert_eq!(latency.len(), 100);

        let (p50, p95, p99) = latency.percentiles();
        let (p50, p95, p99) = (p50.unwrap(), p95.unwrap(), p99.unwrap());
        assert!(p50 <= p95 && p95 <= p99);
        // 3 significant figures: within 0.1% of the exact value.
        assert!((49_900..=50_100).contains(&p50), "p50 = {p50}");
        assert!((98_900..=99_100).contains(&p99), "p99 = {p99}");
    }

    #[test]
    fn oversized_samples_are_clamped_not_dropped() {
        let latency = DrawLatency::new();
        latency.record(Duration::from_secs(3_600));
        assert_eq!(latency.len(), 1);
    }
}
