//! Per-wheel counters.
//! Kept to cheap relaxed atomics; exposition formats are the caller's job.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct WheelStats {
    scheduled: AtomicU64,
    enlisted: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
    flushes: AtomicU64,
}

impl WheelStats {
    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enlisted(&self) {
        self.enlisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            enlisted: self.enlisted.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a wheel's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Tasks accepted through `after_func` / `tick_func`.
    pub scheduled: u64,
    /// Times a task was placed into a bucket (cascades re-count).
    pub enlisted: u64,
    /// Callback firings dispatched to workers.
    pub fired: u64,
    /// Tasks cancelled through their handle.
    pub cancelled: u64,
    /// Buckets flushed by the driver.
    pub flushes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let stats = WheelStats::default();
        stats.record_scheduled();
        stats.record_scheduled();
        stats.record_enlisted();
        stats.record_fired();
        stats.record_flush();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.scheduled, 2);
        assert_eq!(snapshot.enlisted, 1);
        assert_eq!(snapshot.fired, 1);
        assert_eq!(snapshot.cancelled, 0);
        assert_eq!(snapshot.flushes, 1);
    }
}
