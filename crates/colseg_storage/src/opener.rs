//! Openers: capabilities that produce backends for a named resource.
//!
//! The segment layer never opens files itself. A descriptor holds a
//! [`ReadOpener`] and asks it for a fresh reader every time a segment is
//! opened; the write path asks a [`WriteOpener`] for a destination sized for
//! the segment about to be written.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use std::fmt;
use std::path::{Path, PathBuf};

/// Produces readers over one named resource.
pub trait ReadOpener: Send + Sync + fmt::Debug {
    /// Returns the name of the resource, used in logs and errors.
    fn name(&self) -> &str;

    /// Opens a new reader whose offset 0 maps to `base_offset` in the resource.
    ///
    /// Every call yields an independent reader; closing (dropping) one does
    /// not affect others.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be opened.
    fn open(&self, base_offset: u64) -> StorageResult<Box<dyn StorageBackend>>;
}

/// Produces writers over one named destination.
pub trait WriteOpener: Send + Sync + fmt::Debug {
    /// Returns the name of the destination, used in logs and errors.
    fn name(&self) -> &str;

    /// Creates an empty writer for the destination.
    ///
    /// Previous content is discarded. `predicted_size` is the total number
    /// of bytes the caller is about to append; implementations may use it to
    /// reserve space.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be created.
    fn create(&self, predicted_size: u64) -> StorageResult<Box<dyn StorageBackend>>;
}

/// A read-only view of another backend starting at a base offset.
pub struct RangeBackend {
    inner: Box<dyn StorageBackend>,
    base: u64,
}

impl RangeBackend {
    /// Wraps `inner` so that offset 0 maps to `base`.
    #[must_use]
    pub fn new(inner: Box<dyn StorageBackend>, base: u64) -> Self {
        Self { inner, base }
    }
}

impl fmt::Debug for RangeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeBackend")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl StorageBackend for RangeBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let Some(absolute) = self.base.checked_add(offset) else {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size()?,
            });
        };
        self.inner.read_at(absolute, len)
    }

    fn append(&mut self, _data: &[u8]) -> StorageResult<u64> {
        Err(StorageError::ReadOnly)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.size()?.saturating_sub(self.base))
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, _new_size: u64) -> StorageResult<()> {
        Err(StorageError::ReadOnly)
    }
}

fn with_base(
    backend: Box<dyn StorageBackend>,
    base_offset: u64,
) -> Box<dyn StorageBackend> {
    if base_offset == 0 {
        backend
    } else {
        Box::new(RangeBackend::new(backend, base_offset))
    }
}

/// Opens a file on the local file system.
#[derive(Debug, Clone)]
pub struct FileOpener {
    path: PathBuf,
    name: String,
}

impl FileOpener {
    /// Creates an opener for `path`. The file does not need to exist yet.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadOpener for FileOpener {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, base_offset: u64) -> StorageResult<Box<dyn StorageBackend>> {
        let backend = FileBackend::open_read_only(&self.path)?;
        Ok(with_base(Box::new(backend), base_offset))
    }
}

impl WriteOpener for FileOpener {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _predicted_size: u64) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::create(&self.path)?))
    }
}

/// Opens handles over a shared in-memory buffer.
#[derive(Debug)]
pub struct MemoryOpener {
    backend: InMemoryBackend,
    name: String,
}

impl MemoryOpener {
    /// Creates an opener over an empty buffer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Vec::new())
    }

    /// Creates an opener over existing bytes.
    #[must_use]
    pub fn with_data(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            backend: InMemoryBackend::with_data(data),
            name: name.into(),
        }
    }

    /// Returns a copy of the current bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.backend.data()
    }
}

impl ReadOpener for MemoryOpener {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, base_offset: u64) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(with_base(Box::new(self.backend.share()), base_offset))
    }
}

impl WriteOpener for MemoryOpener {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, predicted_size: u64) -> StorageResult<Box<dyn StorageBackend>> {
        let mut backend = self.backend.share();
        backend.truncate(0)?;
        backend.reserve(usize::try_from(predicted_size).unwrap_or(0));
        Ok(Box::new(backend))
    }
}
