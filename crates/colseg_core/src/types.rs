//! Core type definitions for the segment layer.

use crate::error::{SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one segment descriptor.
///
/// Segment IDs namespace the shared block caches. They are assigned per
/// descriptor instance and never reused within an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// Monotonic allocator for [`SegmentId`]s.
///
/// One allocator is created by the owner of the shared caches and handed to
/// every descriptor constructor.
#[derive(Debug)]
pub struct SegmentIdAllocator {
    next: AtomicU64,
}

impl SegmentIdAllocator {
    /// Creates an allocator whose first ID is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocates the next ID.
    pub fn next_id(&self) -> SegmentId {
        SegmentId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SegmentIdAllocator {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

/// SQL type of a column, stored by id in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Variable-length string.
    VarChar,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
}

impl SqlType {
    /// Returns the on-disk id.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Int => 1,
            Self::BigInt => 2,
            Self::Float => 3,
            Self::Double => 4,
            Self::VarChar => 5,
            Self::Date => 6,
            Self::Time => 7,
            Self::DateTime => 8,
        }
    }

    /// Parses an on-disk id.
    pub fn from_id(id: u8) -> SegmentResult<Self> {
        Ok(match id {
            1 => Self::Int,
            2 => Self::BigInt,
            3 => Self::Float,
            4 => Self::Double,
            5 => Self::VarChar,
            6 => Self::Date,
            7 => Self::Time,
            8 => Self::DateTime,
            other => return Err(SegmentError::corrupt(format!("unknown sql type id {other}"))),
        })
    }

    /// Whether min/max bounds are meaningful for this type.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::VarChar)
    }

    /// Whether bounds hold the bit pattern of an `f64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// Storage variant of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SegmentMode {
    /// Packs stored as produced by the encoder.
    #[default]
    Plain,
    /// Packs compressed after encoding.
    Compressed,
}

impl SegmentMode {
    /// Returns the on-disk id.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Plain => 0,
            Self::Compressed => 1,
        }
    }

    /// Parses an on-disk id.
    pub fn from_id(id: u8) -> SegmentResult<Self> {
        match id {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Compressed),
            other => Err(SegmentError::corrupt(format!("unknown segment mode {other}"))),
        }
    }
}

/// One column of a segment schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSchema {
    /// Column name, unique within the segment.
    pub name: String,
    /// SQL type.
    pub sql_type: SqlType,
    /// Whether per-pack indexes are maintained.
    pub is_indexed: bool,
}

impl ColumnSchema {
    /// Creates a column schema.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType, is_indexed: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            is_indexed,
        }
    }
}

/// Ordered columns of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentSchema {
    columns: Vec<ColumnSchema>,
}

impl SegmentSchema {
    /// Creates a schema, rejecting duplicate column names.
    pub fn new(columns: Vec<ColumnSchema>) -> SegmentResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SegmentError::invalid(format!(
                    "duplicate column name {:?}",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Returns the columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Finds a column id by name.
    #[must_use]
    pub fn column_id(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| i as u32)
    }
}
