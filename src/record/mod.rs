//! Record Module
//!
//! The on-disk record format shared by writes, reads, recovery and compaction.
//!
//! ## Responsibilities
//! - Encode a key/value write into its fixed binary layout
//! - CRC32 checksums for corruption detection
//! - Verify a single record read back from a segment
//! - Sequentially scan a whole segment file
//!
//! ## Record Format
//! ```text
//! ┌─────────┬───────────────┬─────────────┬───────────────┬───────┬─────────┐
//! │ CRC (4) │ Timestamp (8) │ KeyLen (8)  │ ValueLen (8)  │  Key  │  Value  │
//! └─────────┴───────────────┴─────────────┴───────────────┴───────┴─────────┘
//!           └──────────────────── covered by CRC ─────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Records carry no separators; a segment
//! is just records back to back.

mod checksum;
mod codec;
mod scanner;

pub use checksum::{checksum, Checksum};
pub use codec::{
    decode_frame, encode, frame_len, now_timestamp, DecodedRecord, EncodedRecord, RecordHeader,
};
pub use scanner::{ScannedRecord, SegmentScanner};

// =============================================================================
// Shared Constants
// =============================================================================

/// Size of the leading checksum
pub const CRC_SIZE: u64 = 4;

/// Timestamp (8) + KeyLen (8) + ValueLen (8)
pub const HEADER_SIZE: u64 = 24;

/// Fixed bytes every record occupies on top of its key and value
pub const FRAME_OVERHEAD: u64 = CRC_SIZE + HEADER_SIZE;
