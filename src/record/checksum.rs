//! Record checksums
//!
//! Standard CRC-32 (reflected polynomial 0xEDB88320, initial value
//! 0xFFFFFFFF, final complement). `crc32fast` picks a table-driven or
//! SIMD implementation at runtime; the output is the same either way.

/// Compute the CRC-32 of a byte buffer
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Streaming CRC-32 for buffers that arrive in pieces
///
/// Feeding `header`, `key`, `value` one after the other yields the same
/// value as [`checksum`] over their concatenation.
#[derive(Default)]
pub struct Checksum {
    hasher: crc32fast::Hasher,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}
