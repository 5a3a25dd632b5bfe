//! Engine statistics
//!
//! Disk accounting that drives the compaction trigger, plus a snapshot
//! struct for callers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide byte counters
///
/// - `total_disk_used`: every record ever appended and not yet deleted,
///   CRC framing included
/// - `actual_data_size`: what the dataset would occupy with zero duplication
#[derive(Debug, Default)]
pub struct UsageCounters {
    total_disk_used: AtomicU64,
    actual_data_size: AtomicU64,
    compactions: AtomicU64,
}

impl UsageCounters {
    /// Counters seeded from what recovery found on disk
    pub fn new(total_disk_used: u64, actual_data_size: u64) -> Self {
        Self {
            total_disk_used: AtomicU64::new(total_disk_used),
            actual_data_size: AtomicU64::new(actual_data_size),
            compactions: AtomicU64::new(0),
        }
    }

    /// Account for a write of `frame_len` bytes
    ///
    /// `previous_frame_len` is the on-disk size of the record it superseded,
    /// if the key already existed.
    pub fn record_write(&self, frame_len: u64, previous_frame_len: Option<u64>) {
        self.total_disk_used.fetch_add(frame_len, Ordering::SeqCst);

        match previous_frame_len {
            None => {
                self.actual_data_size.fetch_add(frame_len, Ordering::SeqCst);
            }
            Some(old) if frame_len >= old => {
                self.actual_data_size.fetch_add(frame_len - old, Ordering::SeqCst);
            }
            Some(old) => {
                let shrink = old - frame_len;
                // Saturate rather than wrap if a concurrent update already
                // brought the counter below the delta.
                let _ = self.actual_data_size.fetch_update(
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    |v| Some(v.saturating_sub(shrink)),
                );
            }
        }
    }

    /// Bytes appended by compaction (copies of live records)
    pub fn record_copy(&self, bytes: u64) {
        self.total_disk_used.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Bytes released by deleting segment files
    pub fn record_freed(&self, bytes: u64) {
        let _ = self.total_disk_used.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some(v.saturating_sub(bytes))
        });
    }

    pub fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_disk_used(&self) -> u64 {
        self.total_disk_used.load(Ordering::SeqCst)
    }

    pub fn actual_data_size(&self) -> u64 {
        self.actual_data_size.load(Ordering::SeqCst)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub segment_count: usize,
    pub active_segment_id: Option<u64>,
    pub key_count: usize,
    pub total_disk_used: u64,
    pub actual_data_size: u64,
    /// Completed compaction passes since open
    pub compactions: u64,
}

impl EngineStats {
    /// `total_disk_used / actual_data_size`, or `None` with no live data
    pub fn amplification(&self) -> Option<f64> {
        if self.actual_data_size == 0 {
            None
        } else {
            Some(self.total_disk_used as f64 / self.actual_data_size as f64)
        }
    }
}
