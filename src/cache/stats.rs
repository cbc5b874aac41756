//! Table Statistics Module
//!
//! Tracks per-table counters for hits, misses, loads, deletions and sweep
//! expirations.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Table Stats ==
/// Point-in-time snapshot of a table's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    /// Lookups answered from the table
    pub hits: u64,
    /// Lookups that found no entry (whether or not a loader then produced one)
    pub misses: u64,
    /// Entries produced by the loader on a miss
    pub loads: u64,
    /// Entries removed by an explicit delete
    pub deletions: u64,
    /// Entries removed by the expiration sweep
    pub expirations: u64,
    /// Current number of entries in the table
    pub total_entries: usize,
}

impl TableStats {
    // == Hit Rate ==
    /// Calculates the table hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by every operation on a table.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    deletions: AtomicU64,
    expirations: AtomicU64,
}

impl StatsRecorder {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletion(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, total_entries: usize) -> TableStats {
        TableStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            total_entries,
        }
    }
}
