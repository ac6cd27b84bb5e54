//! Error types for the segment layer.

use std::io;
use thiserror::Error;

/// Result type for segment operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Errors that can occur while writing, probing or reading segments.
///
/// A file that simply is not an integrated segment is not an error: probing
/// functions return `Ok(None)` for it. [`SegmentError::NotRecognized`] is
/// only produced by descriptors whose footer was deferred and turned out to
/// be missing.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] colseg_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The trailer magic is present but the footer is inconsistent.
    #[error("corrupt segment: {message}")]
    CorruptSegment {
        /// Description of the corruption.
        message: String,
    },

    /// The trailer declares a layout newer than this build understands.
    #[error("unsupported segment layout version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found in the trailer.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },

    /// A descriptor's source turned out not to be an integrated segment.
    #[error("not an integrated segment: {name}")]
    NotRecognized {
        /// Name of the segment.
        name: String,
    },

    /// Read attempted through a closed segment.
    #[error("segment {name} is closed")]
    SegmentClosed {
        /// Name of the segment.
        name: String,
    },

    /// The in-memory segment handed to the writer is malformed.
    #[error("invalid segment: {message}")]
    InvalidSegment {
        /// Description of the problem.
        message: String,
    },

    /// Column id outside the schema.
    #[error("column {column_id} out of range (segment has {column_count} columns)")]
    ColumnOutOfRange {
        /// Requested column.
        column_id: u32,
        /// Number of columns in the segment.
        column_count: u32,
    },

    /// Pack id outside the column.
    #[error("pack {pack_id} out of range (column has {pack_count} packs)")]
    PackOutOfRange {
        /// Requested pack.
        pack_id: u32,
        /// Number of packs in the column.
        pack_count: u32,
    },

    /// The bulk metadata file could not be encoded or decoded.
    #[error("metadata cache error: {message}")]
    MetaCache {
        /// Description of the failure.
        message: String,
    },
}

impl SegmentError {
    /// Creates a corrupt segment error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptSegment {
            message: message.into(),
        }
    }

    /// Creates an invalid segment error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidSegment {
            message: message.into(),
        }
    }

    /// Creates a segment closed error.
    pub fn closed(name: impl Into<String>) -> Self {
        Self::SegmentClosed { name: name.into() }
    }

    /// Creates a metadata cache error.
    pub fn meta_cache(message: impl Into<String>) -> Self {
        Self::MetaCache {
            message: message.into(),
        }
    }

    /// Returns true for errors that mean the file content cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptSegment { .. } | Self::UnsupportedVersion { .. }
        )
    }
}
