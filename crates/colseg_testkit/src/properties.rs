//! Cross-crate property tests over generated segments.

use crate::fixtures::{init_tracing, memory_segment, scenarios, TestDir};
use crate::generators::mem_segment_strategy;
use colseg_core::{
    format::pack_count,
    integrate, meta_cache, BlockCache, BlockCaches, BlockKey, CacheConfig, DpnCache, SegmentError,
    SegmentFd, SegmentId, SegmentIdAllocator,
};
use colseg_storage::{MemoryOpener, ReadOpener};
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip_preserves_structure(segment in mem_segment_strategy(4)) {
        let opener = MemoryOpener::new("prop");
        let written = integrate::write(&segment, &opener).unwrap();
        let read = integrate::probe(&opener).unwrap().unwrap();

        prop_assert_eq!(&read, &written);
        prop_assert_eq!(read.row_count, segment.row_count());
        prop_assert_eq!(read.column_count as usize, segment.schema().len());
        prop_assert_eq!(read.version, segment.version());
        prop_assert_eq!(read.mode, segment.mode());
        prop_assert_eq!(&read.schema().unwrap(), segment.schema());
        for (node, (column, schema)) in read
            .column_node_infos
            .iter()
            .zip(segment.columns().iter().zip(segment.schema().columns()))
        {
            prop_assert_eq!(*node, column.node_for(schema.sql_type));
        }
    }

    #[test]
    fn offsets_are_monotonic(segment in mem_segment_strategy(4)) {
        let opener = MemoryOpener::new("prop");
        let meta = integrate::write(&segment, &opener).unwrap();
        let file_len = opener.data().len() as u64;

        for column in &meta.column_infos {
            prop_assert!(column.dpn_offset <= column.index_offset);
            prop_assert!(column.index_offset <= column.ext_index_offset);
            prop_assert!(column.ext_index_offset <= column.outer_index_offset);
            prop_assert!(column.outer_index_offset + column.outer_index_size <= column.pack_offset);
            prop_assert!(column.pack_offset <= file_len);
        }
    }

    #[test]
    fn every_block_reads_back(segment in mem_segment_strategy(3)) {
        let ids = SegmentIdAllocator::default();
        let (_, fd) = memory_segment(&segment, &ids);
        let opened = fd.open_cached(&BlockCaches::default()).unwrap();

        for (column_id, expected) in segment.columns().iter().enumerate() {
            let column = opened.column(column_id as u32).unwrap();
            prop_assert_eq!(&column.outer_index().unwrap(), &expected.outer_index);
            for (pack_id, pack) in expected.packs.iter().enumerate() {
                let pack_id = pack_id as u32;
                prop_assert_eq!(&column.pack(pack_id).unwrap(), &pack.data);
                prop_assert_eq!(&column.index(pack_id).unwrap(), &pack.index);
                prop_assert_eq!(&column.ext_index(pack_id).unwrap(), &pack.ext_index);
                prop_assert_eq!(column.dpn(pack_id).unwrap().row_count, pack.row_count);
            }
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        crate::fuzz::fuzz_segment_read(&data);
        crate::fuzz::fuzz_segment_open(&data);
    }

    #[test]
    fn block_cache_put_then_get(
        blocks in prop::collection::vec((0u64..4, 0u32..4, prop::collection::vec(any::<u8>(), 1..64)), 1..32)
    ) {
        let cache = BlockCache::new("prop", 1 << 20, 4);
        for (segment, pack, data) in blocks {
            let key = BlockKey::new(SegmentId::new(segment), 0, pack);
            cache.put(key, data.clone().into());
            prop_assert_eq!(cache.get(&key).map(|b| b.to_vec()), Some(data));
        }
    }
}

#[test]
fn concrete_two_column_scenario() {
    let dir = TestDir::new();
    let segment = scenarios::id_name_segment("seg_0", 1000);
    dir.write_segment(&segment);

    let fd = SegmentFd::create("seg_0", dir.opener("seg_0"), &dir.ids, true)
        .unwrap()
        .unwrap();
    let info = fd.info().unwrap();
    assert_eq!(info.column_count(), 2);
    assert_eq!(info.row_count, 1000);
    let names: Vec<_> = info.schema.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name"]);
    assert_eq!(info.column_nodes[0].min_num_value, 0);
    assert_eq!(info.column_nodes[0].max_num_value, 999);

    assert_eq!(pack_count(1000), 1);
    let opened = fd.open().unwrap();
    assert_eq!(opened.column(0).unwrap().dpns().unwrap().len(), 1);
}

#[test]
fn open_independence_across_threads() {
    let ids = SegmentIdAllocator::default();
    let (_, fd) = memory_segment(&scenarios::id_name_segment("seg_0", 70_000), &ids);
    let fd = Arc::new(fd);

    let mut first = fd.open().unwrap();
    let second = {
        let fd = Arc::clone(&fd);
        std::thread::spawn(move || fd.open().unwrap()).join().unwrap()
    };
    first.close();
    first.close();

    assert!(matches!(first.column(0), Err(SegmentError::SegmentClosed { .. })));
    assert_eq!(second.column(1).unwrap().pack(1).unwrap().len(), 4464 * 8);
}

#[test]
fn dpn_cache_is_idempotent_across_opens() {
    let ids = SegmentIdAllocator::default();
    let (opener, fd) = memory_segment(&scenarios::id_name_segment("seg_0", 70_000), &ids);

    let from_first = fd.open().unwrap().column(0).unwrap().dpns().unwrap();

    // An independent parse through a fresh descriptor yields equal content.
    let other = SegmentFd::create("seg_0", opener, &ids, true).unwrap().unwrap();
    let from_second = other.open().unwrap().column(0).unwrap().dpns().unwrap();
    assert_eq!(&*from_first, &*from_second);

    let cache = DpnCache::new(2);
    cache.put(0, from_first.clone());
    cache.put(0, from_second);
    assert_eq!(&*cache.get(0).unwrap(), &*from_first);
}

#[test]
fn shared_caches_namespace_by_descriptor() {
    let ids = SegmentIdAllocator::default();
    let (opener, a) = memory_segment(&scenarios::id_name_segment("seg_0", 1000), &ids);
    let b = SegmentFd::create("seg_0", opener, &ids, true).unwrap().unwrap();
    let caches = BlockCaches::new(&CacheConfig::default());

    let from_a = a.open_cached(&caches).unwrap().column(0).unwrap().pack(0).unwrap();
    let from_b = b.open_cached(&caches).unwrap().column(0).unwrap().pack(0).unwrap();
    assert_eq!(from_a, from_b);
    assert_eq!(caches.pack.len(), 2);

    assert_eq!(caches.remove_segment(a.segment_id()), 1);
    assert_eq!(caches.pack.len(), 1);
}

#[test]
fn meta_cache_bootstraps_file_segments() {
    init_tracing();
    let dir = TestDir::new();
    let fds: Vec<_> = [("seg_0", 1000), ("seg_1", 70_000), ("seg_2", 0)]
        .into_iter()
        .map(|(name, rows)| dir.write_segment(&scenarios::id_name_segment(name, rows)))
        .collect();

    let path = dir.path().join("segments.meta");
    meta_cache::save(&path, &fds).unwrap();

    let ids = SegmentIdAllocator::starting_at(1000);
    let loaded = meta_cache::load_fds(
        &path,
        |name| -> Arc<dyn ReadOpener> { dir.opener(name) },
        &ids,
    )
    .unwrap();
    assert_eq!(loaded.len(), 3);

    for (original, restored) in fds.iter().zip(&loaded) {
        assert_eq!(original.name(), restored.name());
        assert_eq!(original.meta().unwrap(), restored.meta().unwrap());
        assert!(restored.segment_id().as_u64() >= 1000);
    }

    let segment = loaded[1].open().unwrap();
    assert_eq!(segment.column(1).unwrap().pack_count(), 2);
    assert!(loaded[2].open().unwrap().column(0).unwrap().dpns().unwrap().is_empty());
}

#[test]
fn corrupt_footer_is_surfaced() {
    init_tracing();
    let ids = SegmentIdAllocator::default();
    let (opener, _) = memory_segment(&scenarios::id_name_segment("seg_0", 1000), &ids);
    let mut data = opener.data();
    let at = data.len() - 30;
    data[at] ^= 0x55;

    let damaged = Arc::new(MemoryOpener::with_data("seg_0", data));
    let err = SegmentFd::create("seg_0", damaged, &ids, true).unwrap_err();
    assert!(err.is_corruption());
}
