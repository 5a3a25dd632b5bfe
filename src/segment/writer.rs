//! Segment Writer
//!
//! Append handle for a single segment file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::EncodedRecord;

/// Appends records to one segment file
///
/// Used both for the active segment and for compaction output.
pub struct SegmentWriter {
    id: u64,
    path: PathBuf,
    file: File,
    /// Current file length; the offset the next record lands at
    size: u64,
}

impl SegmentWriter {
    /// Create a brand-new, empty segment file
    ///
    /// Fails if the file already exists: segment ids are never reused.
    pub fn create(path: &Path, id: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            size: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether appending `frame_len` more bytes would push the segment past
    /// `max_size`. An empty segment always accepts a record, however large.
    pub fn would_overflow(&self, frame_len: u64, max_size: u64) -> bool {
        self.size > 0 && self.size + frame_len > max_size
    }

    /// Write `[crc][payload]` and flush before returning
    ///
    /// Returns the offset of the record (its CRC), not of the value.
    pub fn append(&mut self, record: &EncodedRecord) -> Result<u64> {
        let frame = record.to_frame();
        let offset = self.size;

        let written = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.flush());

        if let Err(e) = written {
            // Cut off whatever part of the frame made it out so the next
            // record still starts on a record boundary.
            if let Err(trunc) = self.file.set_len(offset) {
                tracing::error!(
                    segment_id = self.id,
                    "failed to roll back partial append at offset {}: {}",
                    offset,
                    trunc
                );
            }
            return Err(e.into());
        }

        self.size += frame.len() as u64;
        Ok(offset)
    }
}
