//! Keydir Module
//!
//! The in-memory index: key → location of its current value on disk.
//!
//! ## Responsibilities
//! - Point lookups for reads
//! - Overwrite on every write (returning the previous entry)
//! - Compare-and-update relocation for compaction
//! - Rebuild from the segment files at startup
//!
//! ## Data Structure Choice
//! HashMap wrapped in a parking_lot RwLock:
//! - Exact-match lookups only, no ordering needed
//! - Lookups share the lock, writes and relocations take it briefly
//! - The lock is never held across disk I/O

mod rebuild;
mod table;

pub use rebuild::RecoveryReport;
pub use table::Keydir;

use crate::record::{frame_len, ScannedRecord, FRAME_OVERHEAD};

/// Location of a key's current value
///
/// Compaction decides liveness by comparing all four fields, so two entries
/// are equal only if they describe the very same record on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeydirEntry {
    pub segment_id: u64,
    pub value_offset: u64,
    pub value_len: u64,
    pub timestamp: u64,
}

impl KeydirEntry {
    /// Entry for a record found while scanning `segment_id`
    pub fn for_scanned(segment_id: u64, record: &ScannedRecord) -> Self {
        Self {
            segment_id,
            value_offset: record.value_offset,
            value_len: record.value_len(),
            timestamp: record.timestamp,
        }
    }

    /// Offset of the record's CRC, given the length of its key
    pub fn record_offset(&self, key_len: u64) -> u64 {
        self.value_offset.saturating_sub(FRAME_OVERHEAD + key_len)
    }

    /// Size of the whole record on disk, given the length of its key
    pub fn frame_len(&self, key_len: u64) -> u64 {
        frame_len(key_len, self.value_len)
    }
}
