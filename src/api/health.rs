//! Shared health state for the /health endpoint.
//! Updated by the draw handler after every execution.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared draw counters. Handlers record, API reads.
#[derive(Default)]
pub struct HealthState {
    pub draws_completed: AtomicU64,
    pub draws_failed: AtomicU64,
    /// Conflicts and in-progress rejections; no draw row is written for these.
    pub draws_rejected: AtomicU64,
    /// Nanosecond timestamp of the last completed draw (0 = none).
    pub last_draw_at_ns: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, at_ns: u64) {
        self.draws_completed.fetch_add(1, Ordering::Relaxed);
        self.last_draw_at_ns.store(at_ns, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.draws_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.draws_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn draws_completed(&self) -> u64 {
        self.draws_completed.load(Ordering::Relaxed)
    }

    pub fn draws_failed(&self) -> u64 {
        self.draws_failed.load(Ordering::Relaxed)
    }

    pub fn draws_rejected(&self) -> u64 {
        self.draws_rejected.load(Ordering::Relaxed)
    }

    pub fn last_draw_at_ns(&self) -> u64 {
        self.last_draw_at_ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let health = HealthState::new();
        assert_eq!(health.draws_completed(), 0);
        assert_eq!(health.last_draw_at_ns(), 0);

        health.record_completed(1_700_000_000_000_000_000);
        health.record_failed();
        health.record_rejected();
        health.record_rejected();

        assert_eq!(health.draws_completed(), 1);
        assert_eq!(health.draws_failed(), 1);
        assert_eq!(health.draws_rejected(), 2);
        assert_eq!(health.last_draw_at_ns(), 1_700_000_000_000_000_000);
    }
}
