//! Storage backend trait definition.

use crate::error::StorageResult;

/// A byte-range store holding one segment image.
///
/// Backends are **opaque**: they know nothing about footers, packs or column
/// sections. The segment layer writes a segment front to back with
/// [`append`](Self::append) and later reads arbitrary ranges with
/// [`read_at`](Self::read_at).
///
/// # Invariants
///
/// - `append` returns the offset where the bytes landed, equal to the size
///   before the call
/// - `read_at` returns exactly the bytes previously appended at that range
/// - A range ending past `size()` is an error, never a short read
/// - Backends are `Send + Sync`; one reader may be shared across threads
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - segment images in memory
/// - [`super::FileBackend`] - segment files
/// - [`super::RangeBackend`] - read-only window starting at a base offset
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range does not lie
    /// within the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is read-only or the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands buffered writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes appended data and file metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the store down to `new_size` bytes.
    ///
    /// Writer openers use this to discard the previous content of a
    /// destination before a new segment is written into it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the store, [`crate::StorageError::ReadOnly`] on readers.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
