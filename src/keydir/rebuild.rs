//! Keydir Recovery
//!
//! Rebuilds the index by replaying every segment on disk.

use crate::error::{CaskError, Result};
use crate::segment::SegmentStore;

use super::{Keydir, KeydirEntry};

/// Outcome of a keydir rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Segments replayed (fully or partially)
    pub segments_scanned: u64,

    /// Records decoded and applied to the keydir
    pub records_recovered: u64,

    /// Records skipped because their checksum did not match
    pub records_corrupted: u64,

    /// Segments whose remainder was skipped after framing was lost or the
    /// file could not be read
    pub segments_abandoned: u64,
}

impl Keydir {
    /// Replay every segment in ascending id order
    ///
    /// Every decoded record unconditionally overwrites its key's entry, so
    /// the last version seen wins. A corrupt record is skipped; a segment
    /// whose length fields cannot be trusted is abandoned at that point and
    /// replay moves on to the next segment.
    pub fn rebuild(store: &SegmentStore) -> Result<(Self, RecoveryReport)> {
        let keydir = Keydir::new();
        let mut report = RecoveryReport::default();

        for segment_id in store.segment_ids() {
            let mut scanner = match store.scan(segment_id) {
                Ok(scanner) => scanner,
                Err(e) => {
                    tracing::error!(segment_id, "cannot open segment for replay: {}", e);
                    report.segments_abandoned += 1;
                    continue;
                }
            };
            report.segments_scanned += 1;

            let mut io_failed = false;
            for item in scanner.by_ref() {
                match item {
                    Ok(record) => {
                        let entry = KeydirEntry::for_scanned(segment_id, &record);
                        keydir.put(record.key, entry);
                        report.records_recovered += 1;
                    }
                    Err(e @ CaskError::CorruptRecord { .. }) => {
                        tracing::warn!("skipping record during replay: {}", e);
                        report.records_corrupted += 1;
                    }
                    Err(e) => {
                        tracing::error!(segment_id, "replay stopped: {}", e);
                        io_failed = true;
                    }
                }
            }

            if scanner.framing_lost() || io_failed {
                tracing::warn!(
                    segment_id,
                    offset = scanner.position(),
                    "abandoning rest of segment"
                );
                report.segments_abandoned += 1;
            }
        }

        Ok((keydir, report))
    }
}
