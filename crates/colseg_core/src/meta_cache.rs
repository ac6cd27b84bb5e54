//! Bulk metadata file: many segments' footers in one place.
//!
//! Reading one small file at startup replaces a seek and footer parse per
//! segment. The file maps segment name to [`SegmentMeta`].
//!
//! ## File Format
//!
//! ```text
//! | magic "COLSEGMC" (8) | version (2) | CBOR map name -> SegmentMeta |
//! ```
//!
//! The file is written to a temporary sibling, synced, then renamed over the
//! destination.

use crate::error::{SegmentError, SegmentResult};
use crate::fd::SegmentFd;
use crate::meta::SegmentMeta;
use crate::types::SegmentIdAllocator;
use colseg_storage::ReadOpener;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Magic bytes opening a metadata file.
pub const META_CACHE_MAGIC: [u8; 8] = *b"COLSEGMC";

/// Current metadata file version.
pub const META_CACHE_VERSION: u16 = 1;

const HEADER_SIZE: usize = 8 + 2;

/// Saves the metadata of every descriptor, resolving deferred footers.
///
/// Later descriptors win when two share a name.
pub fn save<'a>(path: &Path, fds: impl IntoIterator<Item = &'a SegmentFd>) -> SegmentResult<()> {
    let mut metas = BTreeMap::new();
    for fd in fds {
        metas.insert(fd.name().to_string(), fd.meta()?.as_ref().clone());
    }
    save_metas(path, &metas)
}

/// Saves a name to metadata map.
pub fn save_metas(path: &Path, metas: &BTreeMap<String, SegmentMeta>) -> SegmentResult<()> {
    let mut data = Vec::with_capacity(HEADER_SIZE + metas.len() * 256);
    data.extend_from_slice(&META_CACHE_MAGIC);
    data.extend_from_slice(&META_CACHE_VERSION.to_le_bytes());
    ciborium::into_writer(metas, &mut data)
        .map_err(|e| SegmentError::meta_cache(format!("encode failed: {e}")))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path(path);
    if let Err(e) = replace_with(&temp_path, path, &data) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    debug!(
        path = %path.display(),
        segments = metas.len(),
        bytes = data.len(),
        "segment metadata saved"
    );
    Ok(())
}

/// Loads a metadata file.
///
/// # Errors
///
/// Returns [`SegmentError::CorruptSegment`] for a missing magic or an
/// inconsistent entry, [`SegmentError::UnsupportedVersion`] for a newer file,
/// and [`SegmentError::MetaCache`] if the body cannot be decoded.
pub fn load(path: &Path) -> SegmentResult<BTreeMap<String, SegmentMeta>> {
    let data = fs::read(path)?;
    if data.len() < HEADER_SIZE || data[..8] != META_CACHE_MAGIC {
        return Err(SegmentError::corrupt(format!(
            "{} is not a segment metadata file",
            path.display()
        )));
    }

    let version = u16::from_le_bytes([data[8], data[9]]);
    if version > META_CACHE_VERSION {
        return Err(SegmentError::UnsupportedVersion {
            found: u32::from(version),
            supported: u32::from(META_CACHE_VERSION),
        });
    }

    let metas: BTreeMap<String, SegmentMeta> = ciborium::from_reader(&data[HEADER_SIZE..])
        .map_err(|e| SegmentError::meta_cache(format!("decode failed: {e}")))?;
    for (name, meta) in &metas {
        meta.validate().map_err(|e| {
            SegmentError::corrupt(format!("segment {name} in {}: {e}", path.display()))
        })?;
    }

    debug!(path = %path.display(), segments = metas.len(), "segment metadata loaded");
    Ok(metas)
}

/// Loads a metadata file and builds one descriptor per entry, in name order.
///
/// `source_for` maps a segment name to the opener its data is read through.
pub fn load_fds<F>(
    path: &Path,
    mut source_for: F,
    ids: &SegmentIdAllocator,
) -> SegmentResult<Vec<SegmentFd>>
where
    F: FnMut(&str) -> Arc<dyn ReadOpener>,
{
    load(path)?
        .into_iter()
        .map(|(name, meta)| {
            let source = source_for(&name);
            SegmentFd::with_meta(name, meta, source, ids)
        })
        .collect()
}

/// Writes `data` to `temp_path`, syncs it, then renames it over `path`.
fn replace_with(temp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate;
    use crate::mem::{MemColumn, MemPack, MemSegment};
    use crate::types::{ColumnSchema, SegmentMode, SegmentSchema, SqlType};
    use colseg_storage::MemoryOpener;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn segment(name: &str, rows: u32, version: u32) -> MemSegment {
        let schema = SegmentSchema::new(vec![
            ColumnSchema::new("ts", SqlType::DateTime, true),
            ColumnSchema::new("value", SqlType::Double, false),
        ])
        .unwrap();
        let ts = MemColumn::new(vec![MemPack::new(rows, vec![1u8; 64]).with_bounds(10, 99)]);
        let value = MemColumn::new(vec![MemPack::new(rows, vec![2u8; 32])
            .with_bounds((-1.5f64).to_bits() as i64, 3.25f64.to_bits() as i64)]);
        MemSegment::new(name, schema, u64::from(rows), vec![ts, value])
            .unwrap()
            .with_version(version)
            .with_mode(SegmentMode::Compressed)
    }

    fn sources() -> HashMap<String, Arc<MemoryOpener>> {
        [("seg_a", 10, 3), ("seg_b", 20, 4)]
            .into_iter()
            .map(|(name, rows, version)| {
                let opener = Arc::new(MemoryOpener::new(name));
                integrate::write(&segment(name, rows, version), opener.as_ref()).unwrap();
                (name.to_string(), opener)
            })
            .collect()
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segments.meta");
        let ids = SegmentIdAllocator::default();
        let sources = sources();

        let fds: Vec<_> = sources
            .iter()
            .map(|(name, opener)| {
                SegmentFd::create(name.clone(), opener.clone(), &ids, false)
                    .unwrap()
                    .unwrap()
            })
            .collect();
        save(&path, &fds).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        for fd in &fds {
            assert_eq!(&loaded[fd.name()], &*fd.meta().unwrap());
        }
        assert_eq!(loaded["seg_b"].version, 4);
        assert_eq!(loaded["seg_a"].column_node_infos[1].min_f64(), -1.5);
    }

    #[test]
    fn load_fds_opens_segments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("segments.meta");
        let ids = SegmentIdAllocator::starting_at(50);
        let sources = sources();

        let metas: BTreeMap<_, _> = sources
            .iter()
            .map(|(name, opener)| {
                (name.clone(), integrate::probe(opener.as_ref()).unwrap().unwrap())
            })
            .collect();
        save_metas(&path, &metas).unwrap();

        let fds = load_fds(
            &path,
            |name| -> Arc<dyn ReadOpener> { sources[name].clone() },
            &ids,
        )
        .unwrap();
        let names: Vec<_> = fds.iter().map(SegmentFd::name).collect();
        assert_eq!(names, ["seg_a", "seg_b"]);
        assert!(fds.iter().all(SegmentFd::is_resolved));

        let segment = fds[1].open().unwrap();
        assert_eq!(segment.row_count(), 20);
        assert_eq!(&segment.column(1).unwrap().pack(0).unwrap()[..], &[2u8; 32]);
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.meta");
        fs::write(&path, b"not a metadata file").unwrap();
        assert!(load(&path).unwrap_err().is_corruption());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.meta");
        let mut data = META_CACHE_MAGIC.to_vec();
        data.extend_from_slice(&(META_CACHE_VERSION + 1).to_le_bytes());
        fs::write(&path, data).unwrap();
        assert!(matches!(
            load(&path),
            Err(SegmentError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn garbled_body_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbled.meta");
        let mut data = META_CACHE_MAGIC.to_vec();
        data.extend_from_slice(&META_CACHE_VERSION.to_le_bytes());
        data.extend_from_slice(&[0xFF, 0x00, 0x13]);
        fs::write(&path, data).unwrap();
        assert!(matches!(load(&path), Err(SegmentError::MetaCache { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load(&dir.path().join("absent.meta")),
            Err(SegmentError::Io(_))
        ));
    }

    #[test]
    fn failed_replace_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file.
        let path = dir.path().join("segments.meta");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let err = save_metas(&path, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SegmentError::Io(_)));
        assert!(!temp_path(&path).exists());
        assert!(path.join("keep").exists());
    }
}
