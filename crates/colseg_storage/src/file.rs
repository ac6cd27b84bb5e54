//! File-based storage backend for segment files.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// A segment file on the local file system.
///
/// A backend is either a writer, obtained from [`FileBackend::create`] and
/// used once to lay down a whole segment, or a reader obtained from
/// [`FileBackend::open_read_only`]. Readers never observe the file growing:
/// their size is fixed when they are opened, which matches the rule that an
/// integrated segment is never modified after it is written.
///
/// # Durability
///
/// - `flush()` hands buffered bytes to the OS
/// - `sync()` calls `File::sync_all()` on writers and is a no-op on readers
///
/// # Example
///
/// ```no_run
/// use colseg_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut writer = FileBackend::create(Path::new("data/seg_0.seg")).unwrap();
/// writer.append(b"column bytes").unwrap();
/// writer.sync().unwrap();
///
/// let reader = FileBackend::open_read_only(Path::new("data/seg_0.seg")).unwrap();
/// assert_eq!(reader.read_at(7, 5).unwrap(), b"bytes");
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Reads seek, so even shared reads need exclusive access to the cursor.
    file: Mutex<File>,
    size: u64,
    access: Access,
}

impl FileBackend {
    /// Creates (or empties) the file at `path` for writing a new segment.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size: 0,
            access: Access::Write,
        })
    }

    /// Opens an existing segment file for reading only.
    ///
    /// Appends and truncation through the returned backend fail with
    /// [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
            access: Access::Read,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if this backend was opened with
    /// [`FileBackend::open_read_only`].
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.access == Access::Read
    }

    fn writable(&self) -> StorageResult<()> {
        match self.access {
            Access::Write => Ok(()),
            Access::Read => Err(StorageError::ReadOnly),
        }
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.writable()?;
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.get_mut().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.access == Access::Write {
            self.file.get_mut().sync_all()?;
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.writable()?;
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }

        self.file.get_mut().set_len(new_size)?;
        self.size = new_size;
        Ok(())
    }
}
