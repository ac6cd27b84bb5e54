//! Test fixtures and segment helpers.
//!
//! Provides convenience functions for writing segments into temporary
//! directories and common test scenarios.

use colseg_core::{
    format::PACK_ROW_COUNT, ColumnSchema, MemColumn, MemPack, MemSegment, SegmentFd,
    SegmentIdAllocator, SegmentSchema, SqlType,
};
use colseg_storage::{FileOpener, MemoryOpener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output of the segment layer to the test harness.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test;
/// only the first call installs the subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A temporary directory of segment files with automatic cleanup.
pub struct TestDir {
    /// Allocator handed to every descriptor built here.
    pub ids: SegmentIdAllocator,
    temp_dir: TempDir,
}

impl TestDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            ids: SegmentIdAllocator::default(),
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root of the directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the file holding segment `name`.
    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.path().join(format!("{name}.seg"))
    }

    /// Opener over the file of segment `name`.
    pub fn opener(&self, name: &str) -> Arc<FileOpener> {
        Arc::new(FileOpener::new(self.segment_path(name)))
    }

    /// Integrates `segment` into its file and returns the descriptor.
    pub fn write_segment(&self, segment: &MemSegment) -> SegmentFd {
        SegmentFd::integrate_file(segment, self.segment_path(segment.name()), &self.ids)
            .expect("Failed to integrate segment")
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Integrates `segment` into memory and returns the opener alongside the
/// descriptor reading it.
pub fn memory_segment(
    segment: &MemSegment,
    ids: &SegmentIdAllocator,
) -> (Arc<MemoryOpener>, SegmentFd) {
    let opener = Arc::new(MemoryOpener::new(segment.name()));
    let fd = SegmentFd::integrate(segment, opener.as_ref(), opener.clone(), ids)
        .expect("Failed to integrate segment");
    (opener, fd)
}

/// Runs a test with a temporary segment directory.
pub fn with_test_dir<F, R>(f: F) -> R
where
    F: FnOnce(&TestDir) -> R,
{
    let dir = TestDir::new();
    f(&dir)
}

/// Row counts of the packs holding `row_count` rows.
pub fn pack_rows(row_count: u64) -> Vec<u32> {
    let mut rows = Vec::new();
    let mut left = row_count;
    while left > 0 {
        let take = left.min(PACK_ROW_COUNT);
        rows.push(take as u32);
        left -= take;
    }
    rows
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Schema `{id: Int, indexed}, {name: VarChar, not indexed}`.
    pub fn id_name_schema() -> SegmentSchema {
        SegmentSchema::new(vec![
            ColumnSchema::new("id", SqlType::Int, true),
            ColumnSchema::new("name", SqlType::VarChar, false),
        ])
        .expect("Static schema is valid")
    }

    /// A segment over [`id_name_schema`] with ids `0..row_count`.
    ///
    /// Pack `p` of `id` holds `4 * rows` bytes of `p as u8` with an index of
    /// 16 bytes; pack `p` of `name` holds `8 * rows` bytes of `0x80 | p`.
    pub fn id_name_segment(name: &str, row_count: u64) -> MemSegment {
        let mut first_id = 0i64;
        let mut id_packs = Vec::new();
        let mut name_packs = Vec::new();
        for (p, rows) in pack_rows(row_count).into_iter().enumerate() {
            let last_id = first_id + i64::from(rows) - 1;
            id_packs.push(
                MemPack::new(rows, vec![p as u8; rows as usize * 4])
                    .with_index(vec![0xA0 | p as u8; 16])
                    .with_bounds(first_id, last_id),
            );
            name_packs.push(MemPack::new(rows, vec![0x80 | p as u8; rows as usize * 8]));
            first_id = last_id + 1;
        }

        let id = MemColumn::new(id_packs).with_outer_index(b"id-outer".to_vec());
        let names = MemColumn::new(name_packs);
        MemSegment::new(name, id_name_schema(), row_count, vec![id, names])
            .expect("Scenario segment is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows() {
        assert!(pack_rows(0).is_empty());
        assert_eq!(pack_rows(1000), [1000]);
        assert_eq!(pack_rows(PACK_ROW_COUNT * 2 + 1), [65_536, 65_536, 1]);
    }

    #[test]
    fn test_write_segment_to_dir() {
        init_tracing();
        with_test_dir(|dir| {
            let fd = dir.write_segment(&scenarios::id_name_segment("seg_0", 1000));
            assert!(dir.segment_path("seg_0").exists());
            assert_eq!(fd.info().unwrap().row_count, 1000);
        });
    }

    #[test]
    fn test_memory_segment() {
        let ids = SegmentIdAllocator::default();
        let (opener, fd) = memory_segment(&scenarios::id_name_segment("seg_1", 70_000), &ids);
        assert!(!opener.data().is_empty());

        let segment = fd.open().unwrap();
        let id = segment.column(0).unwrap();
        assert_eq!(id.pack_count(), 2);
        assert_eq!(id.dpn(1).unwrap().min_value, 65_536);
    }
}
