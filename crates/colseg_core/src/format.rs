//! Physical layout constants and the fixed-size trailer.
//!
//! ## Layout version 1
//!
//! ```text
//! | column 0: dpns | index | ext index | outer index | packs |
//! | column 1: ... |
//! | footer | trailer (24) |
//!
//! trailer := footer_len (8) | footer_crc32 (4) | layout_version (4) | magic (8)
//! ```
//!
//! There is no header; a reader finds everything by seeking from the end.
//! All integers are little-endian.

use crate::error::{SegmentError, SegmentResult};

/// Rows per pack.
pub const PACK_ROW_COUNT: u64 = 65_536;

/// Encoded size of one data pack node.
pub const DPN_SIZE: usize = 64;

/// Magic bytes closing every integrated segment.
pub const SEGMENT_MAGIC: [u8; 8] = *b"COLSEGv1";

/// Newest layout version this build writes and reads.
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the trailer in bytes.
pub const TRAILER_SIZE: usize = 24;

/// Number of packs needed for `row_count` rows.
#[must_use]
pub const fn pack_count(row_count: u64) -> u64 {
    row_count.div_ceil(PACK_ROW_COUNT)
}

/// CRC32 (IEEE) over footer bytes.
#[must_use]
pub fn footer_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// The fixed tail of an integrated segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Length of the footer preceding the trailer.
    pub footer_len: u64,
    /// CRC32 of the footer bytes.
    pub footer_crc: u32,
    /// Physical layout version.
    pub layout_version: u32,
}

impl Trailer {
    /// Encodes the trailer.
    #[must_use]
    pub fn encode(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[0..8].copy_from_slice(&self.footer_len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.footer_crc.to_le_bytes());
        buf[12..16].copy_from_slice(&self.layout_version.to_le_bytes());
        buf[16..24].copy_from_slice(&SEGMENT_MAGIC);
        buf
    }

    /// Decodes a trailer.
    ///
    /// Returns `Ok(None)` when `data` does not end with the magic, so callers
    /// can probe arbitrary files.
    pub fn decode(data: &[u8]) -> SegmentResult<Option<Self>> {
        if data.len() != TRAILER_SIZE || data[16..24] != SEGMENT_MAGIC {
            return Ok(None);
        }

        let layout_version = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        if layout_version == 0 || layout_version > LAYOUT_VERSION {
            return Err(SegmentError::UnsupportedVersion {
                found: layout_version,
                supported: LAYOUT_VERSION,
            });
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&data[0..8]);

        Ok(Some(Self {
            footer_len: u64::from_le_bytes(len),
            footer_crc: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            layout_version,
        }))
    }
}
