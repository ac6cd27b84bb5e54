//! Fuzz testing harnesses for colseg.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks.

use colseg_core::{integrate, meta_cache, SegmentFd, SegmentIdAllocator, SegmentMeta};
use colseg_storage::{InMemoryBackend, MemoryOpener};
use std::sync::Arc;

/// Fuzz target for footer detection.
///
/// Arbitrary bytes either parse, are rejected as "not a segment", or return
/// a proper error (no panics).
pub fn fuzz_segment_read(data: &[u8]) {
    let backend = InMemoryBackend::with_data(data.to_vec());
    let _ = integrate::read(&backend);
}

/// Fuzz target for footer decoding.
pub fn fuzz_footer_decode(data: &[u8]) {
    let _ = SegmentMeta::decode_footer(data, u64::MAX);
}

/// Fuzz target for reading every block of whatever a byte string parses as.
///
/// A footer that validates may still point at garbage; every read must
/// return data or an error.
pub fn fuzz_segment_open(data: &[u8]) {
    let ids = SegmentIdAllocator::default();
    let source = Arc::new(MemoryOpener::with_data("fuzz", data.to_vec()));
    let Ok(Some(fd)) = SegmentFd::create("fuzz", source, &ids, true) else {
        return;
    };
    let Ok(segment) = fd.open() else {
        return;
    };
    for column_id in 0..segment.factories().len() as u32 {
        let Ok(column) = segment.column(column_id) else {
            continue;
        };
        let _ = column.outer_index();
        for pack_id in 0..column.pack_count().min(4) {
            let _ = column.index(pack_id);
            let _ = column.ext_index(pack_id);
            let _ = column.pack(pack_id);
        }
    }
}

/// Fuzz target for the bulk metadata file.
pub fn fuzz_meta_cache_load(data: &[u8]) {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let path = dir.path().join("fuzz.meta");
    if std::fs::write(&path, data).is_err() {
        return;
    }
    let _ = meta_cache::load(&path);
}
