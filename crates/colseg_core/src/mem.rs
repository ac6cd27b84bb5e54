//! In-memory segments: the input of the integrate write path.
//!
//! Pack, index and extended-index bytes are produced by the column codec,
//! which lives outside this crate. A [`MemSegment`] only checks that the
//! pieces line up with the schema and the fixed pack size.

use crate::error::{SegmentError, SegmentResult};
use crate::format::{pack_count, PACK_ROW_COUNT};
use crate::meta::ColumnNodeMeta;
use crate::types::{SegmentMode, SegmentSchema, SqlType};
use bytes::Bytes;

/// One encoded pack with its indexes and bounds.
#[derive(Debug, Clone, Default)]
pub struct MemPack {
    /// Rows in the pack.
    pub row_count: u32,
    /// Null values among the rows.
    pub null_count: u32,
    /// Encoded row data.
    pub data: Bytes,
    /// Encoded index, empty for non-indexed columns.
    pub index: Bytes,
    /// Encoded extended index.
    pub ext_index: Bytes,
    /// Minimum value (bit pattern for float columns).
    pub min_value: i64,
    /// Maximum value (bit pattern for float columns).
    pub max_value: i64,
}

impl MemPack {
    /// Creates a pack from its encoded data.
    #[must_use]
    pub fn new(row_count: u32, data: impl Into<Bytes>) -> Self {
        Self {
            row_count,
            data: data.into(),
            ..Self::default()
        }
    }

    /// Sets the index bytes.
    #[must_use]
    pub fn with_index(mut self, index: impl Into<Bytes>) -> Self {
        self.index = index.into();
        self
    }

    /// Sets the extended index bytes.
    #[must_use]
    pub fn with_ext_index(mut self, ext_index: impl Into<Bytes>) -> Self {
        self.ext_index = ext_index.into();
        self
    }

    /// Sets the value bounds.
    #[must_use]
    pub fn with_bounds(mut self, min: i64, max: i64) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    /// Sets the null count.
    #[must_use]
    pub fn with_nulls(mut self, null_count: u32) -> Self {
        self.null_count = null_count;
        self
    }
}

/// All packs of one column plus its outer index.
#[derive(Debug, Clone, Default)]
pub struct MemColumn {
    /// Packs in row order.
    pub packs: Vec<MemPack>,
    /// Column-wide index stored after the per-pack sections.
    pub outer_index: Bytes,
    /// Explicit bounds; derived from the packs when absent.
    pub node: Option<ColumnNodeMeta>,
}

impl MemColumn {
    /// Creates a column from its packs.
    #[must_use]
    pub fn new(packs: Vec<MemPack>) -> Self {
        Self {
            packs,
            ..Self::default()
        }
    }

    /// Sets the outer index bytes.
    #[must_use]
    pub fn with_outer_index(mut self, outer_index: impl Into<Bytes>) -> Self {
        self.outer_index = outer_index.into();
        self
    }

    /// Overrides the derived column bounds.
    #[must_use]
    pub fn with_node(mut self, node: ColumnNodeMeta) -> Self {
        self.node = Some(node);
        self
    }

    /// Bounds for this column given its type.
    #[must_use]
    pub fn node_for(&self, sql_type: SqlType) -> ColumnNodeMeta {
        if let Some(node) = self.node {
            return node;
        }
        if !sql_type.is_numeric() || self.packs.is_empty() {
            return ColumnNodeMeta::default();
        }
        if sql_type.is_float() {
            let as_f64 = |bits: i64| f64::from_bits(bits as u64);
            let min = self
                .packs
                .iter()
                .map(|p| as_f64(p.min_value))
                .fold(f64::INFINITY, f64::min);
            let max = self
                .packs
                .iter()
                .map(|p| as_f64(p.max_value))
                .fold(f64::NEG_INFINITY, f64::max);
            return ColumnNodeMeta::from_f64(min, max);
        }
        let min = self.packs.iter().map(|p| p.min_value).min().unwrap_or(0);
        let max = self.packs.iter().map(|p| p.max_value).max().unwrap_or(0);
        ColumnNodeMeta::new(min, max)
    }

    fn data_size(&self) -> u64 {
        let packs: u64 = self
            .packs
            .iter()
            .map(|p| (p.data.len() + p.index.len() + p.ext_index.len()) as u64)
            .sum();
        packs + self.outer_index.len() as u64
    }
}

/// A segment held in memory, ready to be integrated into one file.
#[derive(Debug, Clone)]
pub struct MemSegment {
    name: String,
    version: u32,
    mode: SegmentMode,
    schema: SegmentSchema,
    row_count: u64,
    columns: Vec<MemColumn>,
}

impl MemSegment {
    /// Creates a segment, checking the columns against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidSegment`] if the column count differs
    /// from the schema, a column does not hold `ceil(row_count / 65536)`
    /// packs, a pack exceeds the pack size, or pack rows do not add up to
    /// `row_count`.
    pub fn new(
        name: impl Into<String>,
        schema: SegmentSchema,
        row_count: u64,
        columns: Vec<MemColumn>,
    ) -> SegmentResult<Self> {
        let name = name.into();
        if columns.len() != schema.len() {
            return Err(SegmentError::invalid(format!(
                "segment {name}: schema has {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }

        let expected_packs = pack_count(row_count);
        for (column, column_schema) in columns.iter().zip(schema.columns()) {
            let column_name = &column_schema.name;
            if column.packs.len() as u64 != expected_packs {
                return Err(SegmentError::invalid(format!(
                    "column {column_name}: {} packs for {row_count} rows, expected {expected_packs}",
                    column.packs.len()
                )));
            }
            if let Some(pack) = column
                .packs
                .iter()
                .find(|p| u64::from(p.row_count) > PACK_ROW_COUNT)
            {
                return Err(SegmentError::invalid(format!(
                    "column {column_name}: pack of {} rows exceeds {PACK_ROW_COUNT}",
                    pack.row_count
                )));
            }
            let rows: u64 = column.packs.iter().map(|p| u64::from(p.row_count)).sum();
            if rows != row_count {
                return Err(SegmentError::invalid(format!(
                    "column {column_name}: packs hold {rows} rows, segment has {row_count}"
                )));
            }
            for pack in &column.packs {
                if u32::try_from(pack.data.len()).is_err()
                    || u32::try_from(pack.index.len()).is_err()
                    || u32::try_from(pack.ext_index.len()).is_err()
                {
                    return Err(SegmentError::invalid(format!(
                        "column {column_name}: pack section larger than 4 GiB"
                    )));
                }
            }
        }

        Ok(Self {
            name,
            version: 1,
            mode: SegmentMode::Plain,
            schema,
            row_count,
            columns,
        })
    }

    /// Sets the data version recorded in the footer.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the storage mode recorded in the footer.
    #[must_use]
    pub fn with_mode(mut self, mode: SegmentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Storage mode.
    #[must_use]
    pub const fn mode(&self) -> SegmentMode {
        self.mode
    }

    /// Schema.
    #[must_use]
    pub fn schema(&self) -> &SegmentSchema {
        &self.schema
    }

    /// Row count.
    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Columns in schema order.
    #[must_use]
    pub fn columns(&self) -> &[MemColumn] {
        &self.columns
    }

    /// Bytes of column sections, DPN arrays included.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        let dpns = pack_count(self.row_count) * crate::format::DPN_SIZE as u64;
        self.columns
            .iter()
            .map(|c| c.data_size() + dpns)
            .sum()
    }
}
