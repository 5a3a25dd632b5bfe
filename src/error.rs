//! Error types for CaskKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for CaskKV operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Segment {0} not found")]
    SegmentNotFound(u64),

    // -------------------------------------------------------------------------
    // Data Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record in segment {segment_id} at offset {offset}: {reason}")]
    CorruptRecord {
        segment_id: u64,
        offset: u64,
        reason: String,
    },

    #[error(
        "Truncated read in segment {segment_id} at offset {offset}: \
         requested {requested} bytes, {available} available"
    )]
    Truncated {
        segment_id: u64,
        offset: u64,
        requested: u64,
        available: u64,
    },

    // -------------------------------------------------------------------------
    // Typed Wrapper Errors
    // -------------------------------------------------------------------------
    #[error("Deserialization error: expected {expected} bytes, got {actual}")]
    Deserialization { expected: usize, actual: usize },

    #[error("Deserialization error: value is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Background Errors
    // -------------------------------------------------------------------------
    #[error("Compaction error: {0}")]
    Compaction(String),
}

impl CaskError {
    /// True for both "key absent" and "segment missing".
    ///
    /// Readers cannot tell the two apart and should not try to.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CaskError::KeyNotFound | CaskError::SegmentNotFound(_))
    }

    pub(crate) fn corrupt(segment_id: u64, offset: u64, reason: impl Into<String>) -> Self {
        CaskError::CorruptRecord {
            segment_id,
            offset,
            reason: reason.into(),
        }
    }
}
