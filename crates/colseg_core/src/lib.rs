//! # colseg core
//!
//! Integrated single-file column segments.
//!
//! This crate provides:
//! - The integrate protocol writing an in-memory segment into one file and
//!   reading its footer back ([`integrate`])
//! - Segment descriptors that open a segment any number of times ([`SegmentFd`])
//! - The active segment with per-column accessors ([`IntegratedSegment`])
//! - Pack node and shared block caches ([`cache`])
//! - A bulk metadata file for fast startup ([`meta_cache`])
//!
//! ## Example
//!
//! ```rust
//! use colseg_core::{
//!     ColumnSchema, MemColumn, MemPack, MemSegment, SegmentFd, SegmentIdAllocator,
//!     SegmentSchema, SqlType,
//! };
//! use colseg_storage::MemoryOpener;
//! use std::sync::Arc;
//!
//! let schema = SegmentSchema::new(vec![ColumnSchema::new("id", SqlType::Int, true)]).unwrap();
//! let column = MemColumn::new(vec![MemPack::new(3, vec![1u8, 2, 3]).with_bounds(1, 3)]);
//! let segment = MemSegment::new("seg_0", schema, 3, vec![column]).unwrap();
//!
//! let file = Arc::new(MemoryOpener::new("seg_0"));
//! let ids = SegmentIdAllocator::default();
//! let fd = SegmentFd::integrate(&segment, file.as_ref(), file.clone(), &ids).unwrap();
//!
//! assert_eq!(fd.info().unwrap().row_count, 3);
//! let opened = fd.open().unwrap();
//! assert_eq!(&opened.column(0).unwrap().pack(0).unwrap()[..], &[1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod config;
mod dpn;
mod error;
mod fd;
pub mod format;
mod info;
pub mod integrate;
mod mem;
mod meta;
pub mod meta_cache;
mod segment;
mod types;
mod wire;

pub use cache::{BlockCache, BlockCacheStats, BlockCaches, BlockKey, DpnCache};
pub use config::CacheConfig;
pub use dpn::{decode_dpns, encode_dpns, DataPackNode};
pub use error::{SegmentError, SegmentResult};
pub use fd::SegmentFd;
pub use info::InfoSegment;
pub use mem::{MemColumn, MemPack, MemSegment};
pub use meta::{ColumnMeta, ColumnNodeMeta, SegmentMeta};
pub use segment::{ColumnFactory, IntegratedColumn, IntegratedSegment};
pub use types::{
    ColumnSchema, SegmentId, SegmentIdAllocator, SegmentMode, SegmentSchema, SqlType,
};
