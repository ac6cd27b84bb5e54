//! # colseg storage
//!
//! Byte-range I/O for integrated column segments.
//!
//! This crate provides the lowest-level storage abstraction used by the
//! segment layer. Storage backends are **opaque byte stores** - they do not
//! interpret the data they store.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush)
//! - No knowledge of segment footers, packs or column sections
//! - Must be `Send + Sync` for concurrent access
//! - Openers hand out a fresh, independently owned backend per call
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs
//! - [`RangeBackend`] - Read-only view starting at a base offset
//!
//! ## Example
//!
//! ```rust
//! use colseg_storage::{MemoryOpener, ReadOpener, WriteOpener};
//!
//! let opener = MemoryOpener::new("segment_0");
//! let mut writer = opener.create(11).unwrap();
//! writer.append(b"hello world").unwrap();
//!
//! let reader = ReadOpener::open(&opener, 6).unwrap();
//! assert_eq!(reader.read_at(0, 5).unwrap(), b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod opener;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use opener::{FileOpener, MemoryOpener, RangeBackend, ReadOpener, WriteOpener};
