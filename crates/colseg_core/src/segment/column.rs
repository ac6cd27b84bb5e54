//! Per-column accessors bound to fixed section offsets.

use crate::cache::{BlockCache, BlockCaches, BlockKey, DpnCache};
use crate::dpn::{decode_dpns, DataPackNode};
use crate::error::{SegmentError, SegmentResult};
use crate::meta::ColumnMeta;
use crate::types::{SegmentId, SqlType};
use bytes::Bytes;
use colseg_storage::StorageBackend;
use std::sync::Arc;
use tracing::trace;

/// Everything one column needs to read itself, captured when the segment is
/// opened.
#[derive(Debug, Clone)]
pub struct ColumnFactory {
    segment_id: SegmentId,
    column_id: u32,
    meta: ColumnMeta,
    pack_count: u32,
    /// End of the pack section.
    pack_end: u64,
    dpn_cache: Arc<DpnCache>,
    caches: Option<BlockCaches>,
}

impl ColumnFactory {
    pub(crate) fn new(
        segment_id: SegmentId,
        column_id: u32,
        meta: ColumnMeta,
        pack_count: u32,
        pack_end: u64,
        dpn_cache: Arc<DpnCache>,
        caches: Option<BlockCaches>,
    ) -> Self {
        Self {
            segment_id,
            column_id,
            meta,
            pack_count,
            pack_end,
            dpn_cache,
            caches,
        }
    }

    /// Binds the factory to an open reader.
    #[must_use]
    pub fn create<'a>(&'a self, reader: &'a dyn StorageBackend) -> IntegratedColumn<'a> {
        IntegratedColumn {
            factory: self,
            reader,
        }
    }

    /// Column id within the segment.
    #[must_use]
    pub const fn column_id(&self) -> u32 {
        self.column_id
    }

    /// Captured column metadata.
    #[must_use]
    pub fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    /// Whether reads go through shared caches.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.caches.is_some()
    }
}

/// Which per-pack section a block belongs to.
#[derive(Debug, Clone, Copy)]
enum Section {
    Index,
    ExtIndex,
    Pack,
}

impl Section {
    const fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::ExtIndex => "ext index",
            Self::Pack => "pack",
        }
    }
}

/// Read access to one column of an open segment.
///
/// Borrows the segment's reader, so the segment cannot be closed while a
/// column accessor is alive.
pub struct IntegratedColumn<'a> {
    factory: &'a ColumnFactory,
    reader: &'a dyn StorageBackend,
}

impl std::fmt::Debug for IntegratedColumn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegratedColumn")
            .field("factory", self.factory)
            .finish_non_exhaustive()
    }
}

impl<'a> IntegratedColumn<'a> {
    /// Column name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.factory.meta.name
    }

    /// Column id within the segment.
    #[must_use]
    pub fn column_id(&self) -> u32 {
        self.factory.column_id
    }

    /// SQL type.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        self.factory.meta.sql_type
    }

    /// Number of packs.
    #[must_use]
    pub fn pack_count(&self) -> u32 {
        self.factory.pack_count
    }

    /// All pack nodes of the column, decoded once per descriptor.
    pub fn dpns(&self) -> SegmentResult<Arc<[DataPackNode]>> {
        let factory = self.factory;
        if let Some(dpns) = factory.dpn_cache.get(factory.column_id) {
            return Ok(dpns);
        }

        let meta = &factory.meta;
        let len = meta
            .index_offset
            .checked_sub(meta.dpn_offset)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| SegmentError::corrupt(format!("column {:?}: bad dpn section", meta.name)))?;
        let raw = self.reader.read_at(meta.dpn_offset, len)?;
        let dpns: Arc<[DataPackNode]> = decode_dpns(&raw, factory.pack_count as usize)?.into();

        factory.dpn_cache.put(factory.column_id, Arc::clone(&dpns));
        trace!(
            segment_id = %factory.segment_id,
            column = %meta.name,
            packs = dpns.len(),
            "dpns loaded"
        );
        Ok(dpns)
    }

    /// Node of one pack.
    pub fn dpn(&self, pack_id: u32) -> SegmentResult<DataPackNode> {
        self.check_pack(pack_id)?;
        Ok(self.dpns()?[pack_id as usize])
    }

    /// Index block of one pack. Empty if the pack has no index.
    pub fn index(&self, pack_id: u32) -> SegmentResult<Bytes> {
        self.block(Section::Index, pack_id)
    }

    /// Extended index block of one pack. Empty if the pack has none.
    pub fn ext_index(&self, pack_id: u32) -> SegmentResult<Bytes> {
        self.block(Section::ExtIndex, pack_id)
    }

    /// Encoded data of one pack.
    pub fn pack(&self, pack_id: u32) -> SegmentResult<Bytes> {
        self.block(Section::Pack, pack_id)
    }

    /// Column-wide outer index. Not cached.
    pub fn outer_index(&self) -> SegmentResult<Bytes> {
        let meta = &self.factory.meta;
        if meta.outer_index_size == 0 {
            return Ok(Bytes::new());
        }
        let len = usize::try_from(meta.outer_index_size)
            .map_err(|_| SegmentError::corrupt("outer index does not fit in memory"))?;
        Ok(self.reader.read_at(meta.outer_index_offset, len)?.into())
    }

    fn check_pack(&self, pack_id: u32) -> SegmentResult<()> {
        if pack_id >= self.factory.pack_count {
            return Err(SegmentError::PackOutOfRange {
                pack_id,
                pack_count: self.factory.pack_count,
            });
        }
        Ok(())
    }

    fn block(&self, section: Section, pack_id: u32) -> SegmentResult<Bytes> {
        self.check_pack(pack_id)?;
        let factory = self.factory;
        let key = BlockKey::new(factory.segment_id, factory.column_id, pack_id);
        let cache = factory.caches.as_ref().map(|c| cache_for(c, section));

        if let Some(block) = cache.and_then(|c| c.get(&key)) {
            return Ok(block);
        }

        let block = self.read_block(section, pack_id)?;
        if let Some(cache) = cache {
            if !block.is_empty() {
                cache.put(key, block.clone());
                trace!(
                    segment_id = %factory.segment_id,
                    column = factory.column_id,
                    pack = pack_id,
                    section = section.name(),
                    bytes = block.len(),
                    "block cached"
                );
            }
        }
        Ok(block)
    }

    fn read_block(&self, section: Section, pack_id: u32) -> SegmentResult<Bytes> {
        let dpn = self.dpns()?[pack_id as usize];
        let meta = &self.factory.meta;
        let (base, limit, addr, size) = match section {
            Section::Index => (
                meta.index_offset,
                meta.ext_index_offset,
                dpn.index_addr,
                dpn.index_size,
            ),
            Section::ExtIndex => (
                meta.ext_index_offset,
                meta.outer_index_offset,
                dpn.ext_index_addr,
                dpn.ext_index_size,
            ),
            Section::Pack => (meta.pack_offset, self.factory.pack_end, dpn.pack_addr, dpn.pack_size),
        };
        if size == 0 {
            return Ok(Bytes::new());
        }

        let start = base.checked_add(addr);
        let end = start.and_then(|s| s.checked_add(u64::from(size)));
        let (Some(start), true) = (start, end.is_some_and(|end| end <= limit)) else {
            return Err(SegmentError::corrupt(format!(
                "column {:?} pack {pack_id}: {} block at +{addr} ({size} bytes) leaves its section",
                meta.name,
                section.name()
            )));
        };

        Ok(self.reader.read_at(start, size as usize)?.into())
    }
}

fn cache_for(caches: &BlockCaches, section: Section) -> &BlockCache {
    match section {
        Section::Index => &*caches.index,
        Section::ExtIndex => &*caches.ext_index,
        Section::Pack => &*caches.pack,
    }
}
