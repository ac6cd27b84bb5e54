//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A segment image held in memory.
///
/// Handles created with [`InMemoryBackend::share`] see the same bytes, so a
/// segment written through one handle can be read through another. This is
/// what [`crate::MemoryOpener`] builds on, and what tests use in place of
/// segment files.
///
/// # Example
///
/// ```rust
/// use colseg_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = InMemoryBackend::new();
/// let reader = writer.share();
/// assert_eq!(writer.append(b"dpns").unwrap(), 0);
/// assert_eq!(writer.append(b"packs").unwrap(), 4);
/// assert_eq!(reader.read_at(4, 5).unwrap(), b"packs");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an image over existing bytes, such as a copied segment file.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns another handle over the same bytes.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }

    /// Returns a copy of the image.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Reserves room for at least `additional` more bytes.
    pub fn reserve(&self, additional: usize) {
        self.data.write().reserve(additional);
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_image() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.read_at(0, 0).unwrap().is_empty());
        assert!(backend.data().is_empty());
    }

    #[test]
    fn reads_outside_image_fail() {
        let backend = InMemoryBackend::with_data(b"footer".to_vec());

        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { offset: 10, len: 5, size: 6 })
        ));
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 2),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(6, 0).unwrap().is_empty());
    }

    #[test]
    fn shared_handles_see_same_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.share();

        writer.append(b"segment").unwrap();
        assert_eq!(reader.size().unwrap(), 7);
        assert_eq!(reader.read_at(0, 7).unwrap(), b"segment");
    }

    #[test]
    fn truncate_is_visible_through_shares() {
        let mut writer = InMemoryBackend::with_data(b"stale segment".to_vec());
        let reader = writer.share();

        writer.truncate(5).unwrap();
        assert_eq!(reader.data(), b"stale");
        assert!(matches!(
            writer.truncate(100),
            Err(StorageError::TruncateBeyondEnd { requested: 100, size: 5 })
        ));
    }
}
