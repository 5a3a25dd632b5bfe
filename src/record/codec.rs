//! Record codec
//!
//! Encoding and single-record decoding for the segment record layout.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

use super::{checksum, CRC_SIZE, FRAME_OVERHEAD, HEADER_SIZE};

/// Nanoseconds since the Unix epoch, used as the record timestamp
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Total on-disk size of a record with the given key and value lengths
pub fn frame_len(key_len: u64, value_len: u64) -> u64 {
    FRAME_OVERHEAD + key_len + value_len
}

// =============================================================================
// Encoding
// =============================================================================

/// A record serialized without its CRC prefix
///
/// The segment store computes the checksum and writes `[crc][payload]`.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    payload: Bytes,
    timestamp: u64,
    key_len: u64,
    value_len: u64,
}

impl EncodedRecord {
    /// Header + key + value, exactly the bytes the CRC covers
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn key_len(&self) -> u64 {
        self.key_len
    }

    pub fn value_len(&self) -> u64 {
        self.value_len
    }

    /// Size of the record on disk, CRC included
    pub fn frame_len(&self) -> u64 {
        CRC_SIZE + self.payload.len() as u64
    }

    /// Distance from the start of the frame to the first value byte
    pub fn value_position(&self) -> u64 {
        FRAME_OVERHEAD + self.key_len
    }

    /// `[crc][payload]`, ready to be appended in one write
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.frame_len() as usize);
        frame.extend_from_slice(&checksum(&self.payload).to_le_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Encode a key/value write
pub fn encode(timestamp: u64, key: &[u8], value: &[u8]) -> EncodedRecord {
    let key_len = key.len() as u64;
    let value_len = value.len() as u64;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize + key.len() + value.len());
    buf.put_u64_le(timestamp);
    buf.put_u64_le(key_len);
    buf.put_u64_le(value_len);
    buf.put_slice(key);
    buf.put_slice(value);

    EncodedRecord {
        payload: buf.freeze(),
        timestamp,
        key_len,
        value_len,
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// The fixed-size part of a record frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub timestamp: u64,
    pub key_len: u64,
    pub value_len: u64,
}

impl RecordHeader {
    /// Parse the first `FRAME_OVERHEAD` bytes of a frame
    pub fn parse(raw: &[u8; FRAME_OVERHEAD as usize]) -> Self {
        let mut buf = &raw[..];
        Self {
            crc: buf.get_u32_le(),
            timestamp: buf.get_u64_le(),
            key_len: buf.get_u64_le(),
            value_len: buf.get_u64_le(),
        }
    }

    /// Key + value bytes that follow the header, `None` on overflow
    pub fn body_len(&self) -> Option<u64> {
        self.key_len.checked_add(self.value_len)
    }
}

/// A fully verified record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Decode and verify one complete `[crc][payload]` frame
///
/// `segment_id` and `offset` only feed the error message.
pub fn decode_frame(frame: &[u8], segment_id: u64, offset: u64) -> Result<DecodedRecord> {
    let overhead = FRAME_OVERHEAD as usize;
    if frame.len() < overhead {
        return Err(CaskError::corrupt(
            segment_id,
            offset,
            format!("frame of {} bytes is shorter than a record header", frame.len()),
        ));
    }

    let mut raw = [0u8; FRAME_OVERHEAD as usize];
    raw.copy_from_slice(&frame[..overhead]);
    let header = RecordHeader::parse(&raw);

    let body = (frame.len() - overhead) as u64;
    if header.body_len() != Some(body) {
        return Err(CaskError::corrupt(
            segment_id,
            offset,
            format!(
                "declared lengths ({} + {}) do not match the {} bytes in the frame",
                header.key_len, header.value_len, body
            ),
        ));
    }

    let actual = checksum(&frame[CRC_SIZE as usize..]);
    if actual != header.crc {
        return Err(CaskError::corrupt(
            segment_id,
            offset,
            format!("checksum mismatch: stored {:#010x}, computed {:#010x}", header.crc, actual),
        ));
    }

    let key_end = overhead + header.key_len as usize;
    Ok(DecodedRecord {
        timestamp: header.timestamp,
        key: frame[overhead..key_end].to_vec(),
        value: frame[key_end..].to_vec(),
    })
}
