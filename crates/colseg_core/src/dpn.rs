//! Data pack nodes: per-pack metadata stored at the head of every column.
//!
//! ## DPN Format (64 bytes)
//!
//! ```text
//! | row_count (4) | null_count (4) | pack_addr (8) | pack_size (4) | index_size (4) |
//! | index_addr (8) | ext_index_addr (8) | ext_index_size (4) | reserved (4) |
//! | min_value (8) | max_value (8) |
//! ```
//!
//! Addresses are relative to the start of the matching section of the same
//! column.

use crate::error::{SegmentError, SegmentResult};
use crate::format::DPN_SIZE;
use crate::wire::ByteReader;

/// Metadata for one pack of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPackNode {
    /// Rows stored in the pack.
    pub row_count: u32,
    /// Null values among those rows.
    pub null_count: u32,
    /// Offset of the pack bytes within the pack section.
    pub pack_addr: u64,
    /// Encoded size of the pack.
    pub pack_size: u32,
    /// Offset of the pack's index within the index section.
    pub index_addr: u64,
    /// Size of the pack's index.
    pub index_size: u32,
    /// Offset of the pack's extended index within its section.
    pub ext_index_addr: u64,
    /// Size of the pack's extended index.
    pub ext_index_size: u32,
    /// Minimum value (bit pattern for float columns).
    pub min_value: i64,
    /// Maximum value (bit pattern for float columns).
    pub max_value: i64,
}

impl DataPackNode {
    /// Encodes the node, appending exactly [`DPN_SIZE`] bytes.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.row_count.to_le_bytes());
        buf.extend_from_slice(&self.null_count.to_le_bytes());
        buf.extend_from_slice(&self.pack_addr.to_le_bytes());
        buf.extend_from_slice(&self.pack_size.to_le_bytes());
        buf.extend_from_slice(&self.index_size.to_le_bytes());
        buf.extend_from_slice(&self.index_addr.to_le_bytes());
        buf.extend_from_slice(&self.ext_index_addr.to_le_bytes());
        buf.extend_from_slice(&self.ext_index_size.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&self.min_value.to_le_bytes());
        buf.extend_from_slice(&self.max_value.to_le_bytes());
    }

    fn decode(reader: &mut ByteReader<'_>) -> SegmentResult<Self> {
        let row_count = reader.u32()?;
        let null_count = reader.u32()?;
        let pack_addr = reader.u64()?;
        let pack_size = reader.u32()?;
        let index_size = reader.u32()?;
        let index_addr = reader.u64()?;
        let ext_index_addr = reader.u64()?;
        let ext_index_size = reader.u32()?;
        let _reserved = reader.u32()?;
        let min_value = reader.i64()?;
        let max_value = reader.i64()?;

        Ok(Self {
            row_count,
            null_count,
            pack_addr,
            pack_size,
            index_addr,
            index_size,
            ext_index_addr,
            ext_index_size,
            min_value,
            max_value,
        })
    }
}

/// Encodes a DPN array.
#[must_use]
pub fn encode_dpns(dpns: &[DataPackNode]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(dpns.len() * DPN_SIZE);
    for dpn in dpns {
        dpn.encode_into(&mut buf);
    }
    buf
}

/// Decodes a DPN array of exactly `count` nodes.
pub fn decode_dpns(data: &[u8], count: usize) -> SegmentResult<Vec<DataPackNode>> {
    if data.len() != count * DPN_SIZE {
        return Err(SegmentError::corrupt(format!(
            "dpn section is {} bytes, expected {} for {count} packs",
            data.len(),
            count * DPN_SIZE
        )));
    }

    let mut reader = ByteReader::new(data, "dpn section");
    (0..count).map(|_| DataPackNode::decode(&mut reader)).collect()
}
