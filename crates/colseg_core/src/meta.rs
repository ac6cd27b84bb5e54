//! Structural metadata of an integrated segment, stored in its footer.
//!
//! ## Footer Format
//!
//! ```text
//! | column_meta * column_count | column_node_meta * column_count |
//! | row_count (8) | column_count (4) | version (4) | mode (1) |
//!
//! column_meta      := name_len (2) | name (N) | sql_type (1) | is_indexed (1) |
//!                     dpn_offset (8) | index_offset (8) | ext_index_offset (8) |
//!                     outer_index_offset (8) | outer_index_size (8) | pack_offset (8)
//! column_node_meta := min (8) | max (8)
//! ```
//!
//! The fixed-width fields close the footer so a reader learns the column
//! count before walking the variable-length column entries.

use crate::error::{SegmentError, SegmentResult};
use crate::format::{pack_count, DPN_SIZE};
use crate::types::{ColumnSchema, SegmentMode, SegmentSchema, SqlType};
use crate::wire::ByteReader;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Size of the fixed fields closing the footer.
pub(crate) const FOOTER_TAIL_SIZE: usize = 8 + 4 + 4 + 1;

/// Footer bytes per column, excluding the name itself.
pub(crate) const COLUMN_FIXED_SIZE: usize = 2 + 1 + 1 + 6 * 8 + 16;

/// Location and identity of one column inside the segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// SQL type.
    pub sql_type: SqlType,
    /// Whether per-pack indexes are maintained.
    pub is_indexed: bool,
    /// Start of the DPN array.
    pub dpn_offset: u64,
    /// Start of the index section.
    pub index_offset: u64,
    /// Start of the extended index section.
    pub ext_index_offset: u64,
    /// Start of the outer index.
    pub outer_index_offset: u64,
    /// Length of the outer index.
    pub outer_index_size: u64,
    /// Start of the pack section.
    pub pack_offset: u64,
}

impl ColumnMeta {
    fn encode_into(&self, buf: &mut Vec<u8>) -> SegmentResult<()> {
        let name = self.name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            SegmentError::invalid(format!("column name of {} bytes is too long", name.len()))
        })?;
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(name);
        buf.push(self.sql_type.id());
        buf.push(u8::from(self.is_indexed));
        buf.extend_from_slice(&self.dpn_offset.to_le_bytes());
        buf.extend_from_slice(&self.index_offset.to_le_bytes());
        buf.extend_from_slice(&self.ext_index_offset.to_le_bytes());
        buf.extend_from_slice(&self.outer_index_offset.to_le_bytes());
        buf.extend_from_slice(&self.outer_index_size.to_le_bytes());
        buf.extend_from_slice(&self.pack_offset.to_le_bytes());
        Ok(())
    }

    fn decode(reader: &mut ByteReader<'_>) -> SegmentResult<Self> {
        let name_len = usize::from(reader.u16()?);
        let name = std::str::from_utf8(reader.bytes(name_len)?)
            .map_err(|_| SegmentError::corrupt("column name is not valid UTF-8"))?
            .to_string();
        let sql_type = SqlType::from_id(reader.u8()?)?;
        let is_indexed = match reader.u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(SegmentError::corrupt(format!(
                    "invalid indexed flag {other} for column {name:?}"
                )))
            }
        };

        Ok(Self {
            name,
            sql_type,
            is_indexed,
            dpn_offset: reader.u64()?,
            index_offset: reader.u64()?,
            ext_index_offset: reader.u64()?,
            outer_index_offset: reader.u64()?,
            outer_index_size: reader.u64()?,
            pack_offset: reader.u64()?,
        })
    }

    /// Checks the section ordering against the end of the column's region.
    fn validate(&self, region_end: u64, packs: u64) -> SegmentResult<()> {
        let outer_end = self
            .outer_index_offset
            .checked_add(self.outer_index_size)
            .ok_or_else(|| SegmentError::corrupt(format!("column {:?}: outer index overflows", self.name)))?;

        let ordered = self.dpn_offset <= self.index_offset
            && self.index_offset <= self.ext_index_offset
            && self.ext_index_offset <= self.outer_index_offset
            && outer_end <= self.pack_offset
            && self.pack_offset <= region_end;
        if !ordered {
            return Err(SegmentError::corrupt(format!(
                "column {:?}: section offsets out of order or beyond {region_end}",
                self.name
            )));
        }

        let dpn_bytes = self.index_offset - self.dpn_offset;
        if dpn_bytes != packs * DPN_SIZE as u64 {
            return Err(SegmentError::corrupt(format!(
                "column {:?}: dpn section is {dpn_bytes} bytes, expected {} packs",
                self.name, packs
            )));
        }
        Ok(())
    }
}

/// Numeric bounds of one column, used for pruning.
///
/// Float columns hold the bit pattern of the `f64` bound; non-numeric
/// columns hold zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnNodeMeta {
    /// Minimum value.
    pub min_num_value: i64,
    /// Maximum value.
    pub max_num_value: i64,
}

impl ColumnNodeMeta {
    /// Creates bounds for an integer-like column.
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        Self {
            min_num_value: min,
            max_num_value: max,
        }
    }

    /// Creates bounds for a float column.
    #[must_use]
    pub fn from_f64(min: f64, max: f64) -> Self {
        Self::new(min.to_bits() as i64, max.to_bits() as i64)
    }

    /// Minimum as `f64` for float columns.
    #[must_use]
    pub fn min_f64(&self) -> f64 {
        f64::from_bits(self.min_num_value as u64)
    }

    /// Maximum as `f64` for float columns.
    #[must_use]
    pub fn max_f64(&self) -> f64 {
        f64::from_bits(self.max_num_value as u64)
    }
}

/// Everything needed to locate and describe the content of a segment file.
///
/// Immutable once built; shared behind `Arc` across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Data version chosen by the writer.
    pub version: u32,
    /// Storage variant.
    pub mode: SegmentMode,
    /// Number of columns.
    pub column_count: u32,
    /// Number of rows.
    pub row_count: u64,
    /// Per-column locations, in schema order.
    pub column_infos: Vec<ColumnMeta>,
    /// Per-column bounds, index-aligned with `column_infos`.
    pub column_node_infos: Vec<ColumnNodeMeta>,
    /// End of the column data region, where the footer starts. Not part of
    /// the footer itself; recovered from the trailer when read.
    pub data_end: u64,
}

impl SegmentMeta {
    /// Number of packs every column holds.
    #[must_use]
    pub fn pack_count(&self) -> u64 {
        pack_count(self.row_count)
    }

    /// Rebuilds the schema from the column entries.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::CorruptSegment`] if two columns share a name.
    pub fn schema(&self) -> SegmentResult<SegmentSchema> {
        let columns = self
            .column_infos
            .iter()
            .map(|c| ColumnSchema::new(c.name.clone(), c.sql_type, c.is_indexed))
            .collect();
        SegmentSchema::new(columns).map_err(|e| SegmentError::corrupt(e.to_string()))
    }

    /// End of the pack section of column `column_id`: the start of the next
    /// column, or the data region end for the last one.
    #[must_use]
    pub fn pack_end(&self, column_id: usize) -> u64 {
        self.column_infos
            .get(column_id + 1)
            .map_or(self.data_end, |next| next.dpn_offset)
    }

    /// Encodes the footer.
    pub fn encode_footer(&self) -> SegmentResult<Vec<u8>> {
        let mut buf = Vec::new();
        for column in &self.column_infos {
            column.encode_into(&mut buf)?;
        }
        for node in &self.column_node_infos {
            buf.extend_from_slice(&node.min_num_value.to_le_bytes());
            buf.extend_from_slice(&node.max_num_value.to_le_bytes());
        }
        buf.extend_from_slice(&self.row_count.to_le_bytes());
        buf.extend_from_slice(&self.column_count.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.push(self.mode.id());
        Ok(buf)
    }

    /// Decodes a footer whose data region ends at `data_end`, then validates it.
    pub fn decode_footer(footer: &[u8], data_end: u64) -> SegmentResult<Self> {
        if footer.len() < FOOTER_TAIL_SIZE {
            return Err(SegmentError::corrupt(format!(
                "footer of {} bytes is shorter than its fixed fields",
                footer.len()
            )));
        }

        let (body, tail) = footer.split_at(footer.len() - FOOTER_TAIL_SIZE);
        let mut tail = ByteReader::new(tail, "footer tail");
        let row_count = tail.u64()?;
        let column_count = tail.u32()?;
        let version = tail.u32()?;
        let mode = SegmentMode::from_id(tail.u8()?)?;

        if (column_count as usize).saturating_mul(COLUMN_FIXED_SIZE) > body.len() {
            return Err(SegmentError::corrupt(format!(
                "footer too small for {column_count} columns"
            )));
        }

        let mut reader = ByteReader::new(body, "footer");
        let column_infos = (0..column_count)
            .map(|_| ColumnMeta::decode(&mut reader))
            .collect::<SegmentResult<Vec<_>>>()?;
        let column_node_infos = (0..column_count)
            .map(|_| -> SegmentResult<ColumnNodeMeta> {
                let min = reader.i64()?;
                let max = reader.i64()?;
                Ok(ColumnNodeMeta::new(min, max))
            })
            .collect::<SegmentResult<Vec<_>>>()?;
        if reader.remaining() != 0 {
            return Err(SegmentError::corrupt(format!(
                "column count {column_count} leaves {} footer bytes unread",
                reader.remaining()
            )));
        }

        let meta = Self {
            version,
            mode,
            column_count,
            row_count,
            column_infos,
            column_node_infos,
            data_end,
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Checks every structural invariant against the data region end.
    ///
    /// Columns must follow each other: a column's sections all end before
    /// the next column's DPN array starts.
    pub fn validate(&self) -> SegmentResult<()> {
        let count = self.column_count as usize;
        if self.column_infos.len() != count || self.column_node_infos.len() != count {
            return Err(SegmentError::corrupt(format!(
                "column count {} disagrees with {} column entries and {} node entries",
                self.column_count,
                self.column_infos.len(),
                self.column_node_infos.len()
            )));
        }

        let mut names = HashSet::with_capacity(count);
        let packs = self.pack_count();
        for (id, column) in self.column_infos.iter().enumerate() {
            if !names.insert(column.name.as_str()) {
                return Err(SegmentError::corrupt(format!(
                    "duplicate column name {:?}",
                    column.name
                )));
            }
            column.validate(self.pack_end(id), packs)?;
        }
        Ok(())
    }
}
