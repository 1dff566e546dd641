//! Module: obs
//! Responsibility: lightweight, always-on counters for the call sites that
//! matter operationally (entries written, violations recorded, cursor
//! pages served, planner cache hits), plus the `tracing` span convention
//! every transaction-shaped operation in this crate follows.
//! Does not own: a metrics backend wire format — counters are exposed as
//! plain `u64` snapshots for whatever exporter the embedding application
//! chooses.

use std::sync::atomic::{AtomicU64, Ordering};

///
/// Metrics
///
/// Process-wide counters. Cheap enough to bump on every call; `snapshot`
/// is the only allocation, and only a test or a metrics-scrape path calls
/// it.
///

#[derive(Default)]
pub struct Metrics {
    entries_written: AtomicU64,
    entries_cleared: AtomicU64,
    violations_recorded: AtomicU64,
    cursor_pages_served: AtomicU64,
    planner_cache_hits: AtomicU64,
    planner_cache_misses: AtomicU64,
    retry_attempts: AtomicU64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entries_written(&self, n: u64) {
        self.entries_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_entries_cleared(&self, n: u64) {
        self.entries_cleared.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cursor_page(&self) {
        self.cursor_pages_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planner_cache_hit(&self) {
        self.planner_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planner_cache_miss(&self) {
        self.planner_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_written: self.entries_written.load(Ordering::Relaxed),
            entries_cleared: self.entries_cleared.load(Ordering::Relaxed),
            violations_recorded: self.violations_recorded.load(Ordering::Relaxed),
            cursor_pages_served: self.cursor_pages_served.load(Ordering::Relaxed),
            planner_cache_hits: self.planner_cache_hits.load(Ordering::Relaxed),
            planner_cache_misses: self.planner_cache_misses.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
    pub entries_written: u64,
    pub entries_cleared: u64,
    pub violations_recorded: u64,
    pub cursor_pages_served: u64,
    pub planner_cache_hits: u64,
    pub planner_cache_misses: u64,
    pub retry_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_entries_written(3);
        metrics.record_entries_written(2);
        metrics.record_violation();
        let snap = metrics.snapshot();
        assert_eq!(snap.entries_written, 5);
        assert_eq!(snap.violations_recorded, 1);
    }
}
