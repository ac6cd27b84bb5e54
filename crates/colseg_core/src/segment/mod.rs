//! The active segment: one open reader over an integrated segment file.
//!
//! An [`IntegratedSegment`] is produced by [`crate::SegmentFd::open`]. It owns
//! exactly one reader and one [`ColumnFactory`] per column. Column accessors
//! borrow the segment, so it cannot be closed while one is in use.

mod column;

pub use column::{ColumnFactory, IntegratedColumn};

use crate::cache::{BlockCaches, DpnCache};
use crate::error::{SegmentError, SegmentResult};
use crate::meta::{ColumnNodeMeta, SegmentMeta};
use crate::types::{SegmentId, SegmentMode, SegmentSchema};
use colseg_storage::StorageBackend;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An opened integrated segment.
pub struct IntegratedSegment {
    segment_id: SegmentId,
    name: String,
    version: u32,
    mode: SegmentMode,
    schema: SegmentSchema,
    row_count: u64,
    column_nodes: Vec<ColumnNodeMeta>,
    factories: Vec<ColumnFactory>,
    reader: Option<Box<dyn StorageBackend>>,
}

impl IntegratedSegment {
    pub(crate) fn new(
        segment_id: SegmentId,
        name: &str,
        meta: &SegmentMeta,
        reader: Box<dyn StorageBackend>,
        dpn_cache: &Arc<DpnCache>,
        caches: Option<&BlockCaches>,
    ) -> SegmentResult<Self> {
        let pack_count = u32::try_from(meta.pack_count())
            .map_err(|_| SegmentError::corrupt(format!("{} rows is too many packs", meta.row_count)))?;

        let schema = meta.schema()?;
        let factories = meta
            .column_infos
            .iter()
            .enumerate()
            .map(|(i, column)| {
                ColumnFactory::new(
                    segment_id,
                    i as u32,
                    column.clone(),
                    pack_count,
                    meta.pack_end(i),
                    Arc::clone(dpn_cache),
                    caches.cloned(),
                )
            })
            .collect();

        Ok(Self {
            segment_id,
            name: name.to_string(),
            version: meta.version,
            mode: meta.mode,
            schema,
            row_count: meta.row_count,
            column_nodes: meta.column_node_infos.clone(),
            factories,
            reader: Some(reader),
        })
    }

    /// Identity of the descriptor this segment was opened from.
    #[must_use]
    pub const fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Storage variant.
    #[must_use]
    pub const fn mode(&self) -> SegmentMode {
        self.mode
    }

    /// Column schema.
    #[must_use]
    pub fn schema(&self) -> &SegmentSchema {
        &self.schema
    }

    /// Number of rows.
    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Per-column bounds.
    #[must_use]
    pub fn column_nodes(&self) -> &[ColumnNodeMeta] {
        &self.column_nodes
    }

    /// Column factories, one per column.
    #[must_use]
    pub fn factories(&self) -> &[ColumnFactory] {
        &self.factories
    }

    /// Returns an accessor for column `column_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::SegmentClosed`] after [`close`](Self::close),
    /// or [`SegmentError::ColumnOutOfRange`] for an unknown id.
    pub fn column(&self, column_id: u32) -> SegmentResult<IntegratedColumn<'_>> {
        let reader = self.reader()?;
        let factory = self
            .factories
            .get(column_id as usize)
            .ok_or(SegmentError::ColumnOutOfRange {
                column_id,
                column_count: self.factories.len() as u32,
            })?;
        Ok(factory.create(reader))
    }

    /// Returns an accessor for the column called `name`, if there is one.
    pub fn column_by_name(&self, name: &str) -> SegmentResult<Option<IntegratedColumn<'_>>> {
        match self.schema.column_id(name) {
            Some(id) => self.column(id).map(Some),
            None => {
                self.reader()?;
                Ok(None)
            }
        }
    }

    /// Releases the reader. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(segment_id = %self.segment_id, name = %self.name, "segment closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn reader(&self) -> SegmentResult<&dyn StorageBackend> {
        self.reader
            .as_deref()
            .ok_or_else(|| SegmentError::closed(&self.name))
    }
}

impl fmt::Debug for IntegratedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegratedSegment")
            .field("segment_id", &self.segment_id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("mode", &self.mode)
            .field("row_count", &self.row_count)
            .field("columns", &self.factories.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlockKey;
    use crate::config::CacheConfig;
    use crate::integrate;
    use crate::mem::{MemColumn, MemPack, MemSegment};
    use crate::types::{ColumnSchema, SqlType};
    use colseg_storage::{MemoryOpener, ReadOpener};

    fn two_pack_segment() -> MemSegment {
        let schema = SegmentSchema::new(vec![
            ColumnSchema::new("id", SqlType::BigInt, true),
            ColumnSchema::new("tag", SqlType::VarChar, false),
        ])
        .unwrap();
        let id = MemColumn::new(vec![
            MemPack::new(65_536, vec![1u8; 300])
                .with_index(vec![10u8; 12])
                .with_ext_index(vec![20u8; 5])
                .with_bounds(0, 65_535),
            MemPack::new(464, vec![2u8; 100])
                .with_index(vec![11u8; 7])
                .with_bounds(65_536, 65_999),
        ])
        .with_outer_index(b"outer".to_vec());
        let tag = MemColumn::new(vec![
            MemPack::new(65_536, vec![3u8; 50]).with_nulls(4),
            MemPack::new(464, vec![4u8; 60]),
        ]);
        MemSegment::new("seg_2", schema, 66_000, vec![id, tag]).unwrap()
    }

    fn open(caches: Option<&BlockCaches>) -> (IntegratedSegment, Arc<DpnCache>) {
        let opener = MemoryOpener::new("seg_2");
        let meta = integrate::write(&two_pack_segment(), &opener).unwrap();
        let dpn_cache = Arc::new(DpnCache::new(2));
        let reader = ReadOpener::open(&opener, 0).unwrap();
        let segment =
            IntegratedSegment::new(SegmentId::new(9), "seg_2", &meta, reader, &dpn_cache, caches)
                .unwrap();
        (segment, dpn_cache)
    }

    #[test]
    fn reads_every_section() {
        let (segment, dpn_cache) = open(None);
        assert_eq!(segment.row_count(), 66_000);
        assert_eq!(segment.factories().len(), 2);

        let id = segment.column(0).unwrap();
        assert_eq!(id.name(), "id");
        assert_eq!(id.pack_count(), 2);
        assert_eq!(&id.pack(0).unwrap()[..], &[1u8; 300]);
        assert_eq!(&id.pack(1).unwrap()[..], &[2u8; 100]);
        assert_eq!(&id.index(1).unwrap()[..], &[11u8; 7]);
        assert_eq!(&id.ext_index(0).unwrap()[..], &[20u8; 5]);
        assert!(id.ext_index(1).unwrap().is_empty());
        assert_eq!(&id.outer_index().unwrap()[..], b"outer");
        assert_eq!(id.dpn(1).unwrap().min_value, 65_536);
        assert_eq!(dpn_cache.loaded(), 1);

        let tag = segment.column_by_name("tag").unwrap().unwrap();
        assert_eq!(tag.dpn(0).unwrap().null_count, 4);
        assert_eq!(&tag.pack(1).unwrap()[..], &[4u8; 60]);
        assert!(tag.outer_index().unwrap().is_empty());
        assert!(segment.column_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn out_of_range_ids() {
        let (segment, _) = open(None);
        assert!(matches!(
            segment.column(2),
            Err(SegmentError::ColumnOutOfRange { column_id: 2, column_count: 2 })
        ));
        let id = segment.column(0).unwrap();
        assert!(matches!(
            id.pack(2),
            Err(SegmentError::PackOutOfRange { pack_id: 2, pack_count: 2 })
        ));
    }

    #[test]
    fn close_is_idempotent_and_fails_later_reads() {
        let (mut segment, _) = open(None);
        segment.close();
        segment.close();
        assert!(segment.is_closed());
        assert!(matches!(
            segment.column(0),
            Err(SegmentError::SegmentClosed { .. })
        ));
        assert!(segment.column_by_name("missing").is_err());
    }

    #[test]
    fn cached_reads_populate_shared_caches() {
        let caches = BlockCaches::new(&CacheConfig::new().shards(2));
        let (segment, _) = open(Some(&caches));
        let id = segment.column(0).unwrap();

        let first = id.pack(0).unwrap();
        let key = BlockKey::new(SegmentId::new(9), 0, 0);
        assert_eq!(caches.pack.get(&key), Some(first.clone()));
        assert_eq!(id.pack(0).unwrap(), first);
        assert!(caches.pack.stats().hits >= 2);

        id.index(0).unwrap();
        assert!(caches.index.get(&key).is_some());
        // Empty blocks are never stored.
        id.ext_index(1).unwrap();
        assert!(caches.ext_index.get(&BlockKey::new(SegmentId::new(9), 0, 1)).is_none());
    }

    #[test]
    fn corrupt_dpn_address_is_detected() {
        let opener = MemoryOpener::new("seg_2");
        let meta = integrate::write(&two_pack_segment(), &opener).unwrap();
        let mut data = opener.data();
        // pack_addr of the second id pack, bytes 8..16 of its dpn.
        let at = crate::format::DPN_SIZE + 8;
        data[at..at + 8].copy_from_slice(&(1u64 << 40).to_le_bytes());

        let damaged = MemoryOpener::with_data("seg_2", data);
        let reader = ReadOpener::open(&damaged, 0).unwrap();
        let segment = IntegratedSegment::new(
            SegmentId::new(1),
            "seg_2",
            &meta,
            reader,
            &Arc::new(DpnCache::new(2)),
            None,
        )
        .unwrap();
        assert!(segment.column(0).unwrap().pack(1).unwrap_err().is_corruption());
    }

    #[test]
    fn last_column_pack_cannot_reach_footer() {
        let opener = MemoryOpener::new("seg_2");
        let meta = integrate::write(&two_pack_segment(), &opener).unwrap();
        let mut data = opener.data();
        // The tag packs hold 110 bytes; pack 0 (50 bytes) moved to +100
        // would end inside the footer.
        let at = meta.column_infos[1].dpn_offset as usize + 8;
        data[at..at + 8].copy_from_slice(&100u64.to_le_bytes());

        let damaged = MemoryOpener::with_data("seg_2", data);
        let reader = ReadOpener::open(&damaged, 0).unwrap();
        let segment = IntegratedSegment::new(
            SegmentId::new(1),
            "seg_2",
            &meta,
            reader,
            &Arc::new(DpnCache::new(2)),
            None,
        )
        .unwrap();
        let tag = segment.column(1).unwrap();
        assert!(tag.pack(0).unwrap_err().is_corruption());
        assert_eq!(&tag.pack(1).unwrap()[..], &[4u8; 60]);
    }

    #[test]
    fn duplicate_column_names_fail_open() {
        let opener = MemoryOpener::new("seg_2");
        let mut meta = integrate::write(&two_pack_segment(), &opener).unwrap();
        meta.column_infos[1].name = "id".to_string();

        let reader = ReadOpener::open(&opener, 0).unwrap();
        let err = IntegratedSegment::new(
            SegmentId::new(1),
            "seg_2",
            &meta,
            reader,
            &Arc::new(DpnCache::new(2)),
            None,
        )
        .unwrap_err();
        assert!(err.is_corruption());
    }
}
