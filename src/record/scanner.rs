//! Segment Scanner
//!
//! Sequential iteration over every record in a segment file. Used by
//! startup recovery and by compaction.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{CaskError, Result};

use super::{frame_len, Checksum, RecordHeader, CRC_SIZE, FRAME_OVERHEAD};

/// One record as found on disk, with its location
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Offset of the CRC, i.e. the first byte of the frame
    pub record_offset: u64,
    /// Offset of the first value byte (what the keydir stores)
    pub value_offset: u64,
}

impl ScannedRecord {
    pub fn value_len(&self) -> u64 {
        self.value.len() as u64
    }

    pub fn frame_len(&self) -> u64 {
        frame_len(self.key.len() as u64, self.value.len() as u64)
    }
}

/// Iterator over the records of one segment, in file order
///
/// Yields `Err(CorruptRecord)` for a record whose checksum does not match;
/// iteration can continue past it. When the length fields themselves cannot
/// be trusted the scanner yields one error, sets [`framing_lost`] and stops.
///
/// [`framing_lost`]: SegmentScanner::framing_lost
pub struct SegmentScanner {
    segment_id: u64,
    reader: BufReader<File>,
    /// Bytes in the file when the scan started
    file_len: u64,
    /// Offset of the next unread byte
    position: u64,
    done: bool,
    framing_lost: bool,
    trailing_bytes: u64,
}

impl SegmentScanner {
    /// Open a segment file for scanning
    pub fn open(path: &Path, segment_id: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            segment_id,
            reader: BufReader::new(file),
            file_len,
            position: 0,
            done: false,
            framing_lost: false,
            trailing_bytes: 0,
        })
    }

    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Offset of the next record to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length fields were corrupt; the rest of the segment is unreadable
    pub fn framing_lost(&self) -> bool {
        self.framing_lost
    }

    /// Bytes left at the end that were too short to hold a checksum
    pub fn trailing_bytes(&self) -> u64 {
        self.trailing_bytes
    }

    fn lose_framing(&mut self, reason: String) -> CaskError {
        self.done = true;
        self.framing_lost = true;
        CaskError::corrupt(self.segment_id, self.position, reason)
    }

    fn read_record(&mut self) -> Result<Option<ScannedRecord>> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            self.done = true;
            return Ok(None);
        }

        if remaining < CRC_SIZE {
            tracing::warn!(
                segment_id = self.segment_id,
                offset = self.position,
                "ignoring {} trailing bytes at end of segment",
                remaining
            );
            self.trailing_bytes = remaining;
            self.done = true;
            return Ok(None);
        }

        if remaining < FRAME_OVERHEAD {
            return Err(self.lose_framing(format!(
                "record header needs {} bytes, only {} left in segment",
                FRAME_OVERHEAD, remaining
            )));
        }

        let mut raw = [0u8; FRAME_OVERHEAD as usize];
        self.read_exact(&mut raw)?;
        let header = RecordHeader::parse(&raw);

        // Validate lengths against the file before allocating anything.
        let available = remaining - FRAME_OVERHEAD;
        match header.body_len() {
            Some(body) if body <= available => {}
            _ => {
                return Err(self.lose_framing(format!(
                    "declared key/value lengths ({} + {}) exceed the {} bytes left in segment",
                    header.key_len, header.value_len, available
                )));
            }
        }

        let mut key = vec![0u8; header.key_len as usize];
        self.read_exact(&mut key)?;
        let mut value = vec![0u8; header.value_len as usize];
        self.read_exact(&mut value)?;

        let record_offset = self.position;
        self.position += frame_len(header.key_len, header.value_len);

        let mut crc = Checksum::new();
        crc.update(&raw[CRC_SIZE as usize..]);
        crc.update(&key);
        crc.update(&value);
        let actual = crc.finalize();
        if actual != header.crc {
            return Err(CaskError::corrupt(
                self.segment_id,
                record_offset,
                format!(
                    "checksum mismatch: stored {:#010x}, computed {:#010x}",
                    header.crc, actual
                ),
            ));
        }

        Ok(Some(ScannedRecord {
            timestamp: header.timestamp,
            value_offset: record_offset + FRAME_OVERHEAD + header.key_len,
            record_offset,
            key,
            value,
        }))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = self.reader.read_exact(buf) {
            // The file shrank underneath us or the device failed; either way
            // the stream position is no longer known.
            self.done = true;
            return Err(CaskError::Io(e));
        }
        Ok(())
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.read_record().transpose()
    }
}
