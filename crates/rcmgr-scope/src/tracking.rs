//! High-water marks of System usage.
//!
//! Observed after every committed reservation and every opened connection or
//! stream. Reads never take the arena lock.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use rcmgr_core::types::ScopeStat;

/// Largest value each dimension has reached since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakUsage {
    pub memory: i64,
    pub streams: usize,
    pub conns: usize,
    pub fd: usize,
}

#[derive(Debug, Default)]
pub struct PeakTracker {
    memory: AtomicI64,
    streams: AtomicUsize,
    conns: AtomicUsize,
    fd: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise every high-water mark that `stat` exceeds.
    pub fn observe(&self, stat: &ScopeStat) {
        let prev = self.memory.fetch_max(stat.memory, Ordering::Relaxed);
        if stat.memory > prev {
            #[cfg(feature = "tracing")]
            tracing::trace!(peak = stat.memory, "new system memory peak");
        }
        self.streams.fetch_max(stat.num_streams(), Ordering::Relaxed);
        self.conns.fetch_max(stat.num_conns(), Ordering::Relaxed);
        self.fd.fetch_max(stat.num_fd, Ordering::Relaxed);
    }

    pub fn memory(&self) -> i64 {
        self.memory.load(Ordering::Relaxed)
    }

    pub fn usage(&self) -> PeakUsage {
        PeakUsage {
            memory: self.memory.load(Ordering::Relaxed),
            streams: self.streams.load(Ordering::Relaxed),
            conns: self.conns.load(Ordering::Relaxed),
            fd: self.fd.load(Ordering::Relaxed),
        }
    }
}
