//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Live counters shared between a [`SinkHandle`](crate::SinkHandle) and its worker
#[derive(Debug, Default)]
pub struct SinkStats {
    pending: AtomicUsize,
    written: AtomicU64,
    artifacts: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    slowest_write_ms: AtomicU64,
}

impl SinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports queued but not yet written
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_written(&self, produced_file: bool, elapsed: Duration) {
        self.written.fetch_add(1, Ordering::Relaxed);
        if produced_file {
            self.artifacts.fetch_add(1, Ordering::Relaxed);
        }
        self.slowest_write_ms
            .fetch_max(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            pending: self.pending(),
            written: self.written(),
            artifacts: self.artifacts.load(Ordering::Relaxed),
            failed: self.failed(),
            dropped: self.dropped(),
            slowest_write_ms: self.slowest_write_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub pending: usize,
    pub written: u64,
    /// Writes that produced a file
    pub artifacts: u64,
    pub failed: u64,
    pub dropped: u64,
    pub slowest_write_ms: u64,
}

impl SinkStatsSnapshot {
    /// Every queued report reached the sink without error
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.dropped == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_without_file_is_not_an_artifact() {
        let stats = SinkStats::new();
        stats.record_written(true, Duration::from_millis(12));
        stats.record_written(false, Duration::from_millis(3));

        let snap = stats.snapshot();
        assert_eq!(snap.written, 2);
        assert_eq!(snap.artifacts, 1);
        assert_eq!(snap.slowest_write_ms, 12);
        assert!(snap.is_clean());
    }

    #[test]
    fn test_drop_marks_snapshot_unclean() {
        let stats = SinkStats::new();
        stats.record_dropped();
        assert!(!stats.snapshot().is_clean());
        assert_eq!(stats.dropped(), 1);
    }
}
