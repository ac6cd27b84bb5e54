//! Pruning summary of a segment, available without opening it.

use crate::error::{SegmentError, SegmentResult};
use crate::format::pack_count;
use crate::meta::{ColumnNodeMeta, SegmentMeta};
use crate::types::{SegmentMode, SegmentSchema};

/// Structural summary a query planner uses to skip segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSegment {
    /// Data version.
    pub version: u32,
    /// Storage variant.
    pub mode: SegmentMode,
    /// Segment name.
    pub name: String,
    /// Number of rows.
    pub row_count: u64,
    /// Column schema in declaration order.
    pub schema: SegmentSchema,
    /// Per-column bounds, index-aligned with the schema.
    pub column_nodes: Vec<ColumnNodeMeta>,
}

impl InfoSegment {
    /// Derives the summary from a segment's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::CorruptSegment`] if column names repeat or the
    /// bounds do not line up with the columns.
    pub fn from_meta(name: impl Into<String>, meta: &SegmentMeta) -> SegmentResult<Self> {
        let schema = meta.schema()?;
        if meta.column_node_infos.len() != schema.len() {
            return Err(SegmentError::corrupt(format!(
                "{} column bounds for {} columns",
                meta.column_node_infos.len(),
                schema.len()
            )));
        }
        Ok(Self {
            version: meta.version,
            mode: meta.mode,
            name: name.into(),
            row_count: meta.row_count,
            schema,
            column_nodes: meta.column_node_infos.clone(),
        })
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Number of packs per column.
    #[must_use]
    pub fn pack_count(&self) -> u64 {
        pack_count(self.row_count)
    }

    /// Bounds of a column looked up by name.
    #[must_use]
    pub fn column_node(&self, name: &str) -> Option<&ColumnNodeMeta> {
        let id = self.schema.column_id(name)?;
        self.column_nodes.get(id as usize)
    }

    /// Whether the integer column `name` may hold a value in `[min, max]`.
    ///
    /// Unknown and non-numeric columns always may, unless the segment is
    /// empty. Float columns compare as `f64`.
    #[must_use]
    pub fn may_overlap(&self, name: &str, min: i64, max: i64) -> bool {
        if self.row_count == 0 {
            return false;
        }
        let Some(id) = self.schema.column_id(name) else {
            return true;
        };
        let column = &self.schema.columns()[id as usize];
        let Some(node) = self.column_nodes.get(id as usize) else {
            return true;
        };
        if !column.sql_type.is_numeric() {
            return true;
        }
        if column.sql_type.is_float() {
            return node.max_f64() >= min as f64 && node.min_f64() <= max as f64;
        }
        node.max_num_value >= min && node.min_num_value <= max
    }
}
