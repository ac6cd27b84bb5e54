//! Segment descriptors.
//!
//! A [`SegmentFd`] is the long-lived handle to one integrated segment: its
//! name, identity, metadata and the opener it reads through. It holds no
//! file resources itself; every [`open`](SegmentFd::open) obtains a fresh
//! reader and returns an independent [`IntegratedSegment`].

use crate::cache::{BlockCaches, DpnCache};
use crate::error::{SegmentError, SegmentResult};
use crate::info::InfoSegment;
use crate::integrate;
use crate::mem::MemSegment;
use crate::meta::SegmentMeta;
use crate::segment::IntegratedSegment;
use crate::types::{SegmentId, SegmentIdAllocator};
use colseg_storage::{FileOpener, ReadOpener, WriteOpener};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Metadata-derived state, built once per descriptor.
#[derive(Debug)]
struct FdState {
    meta: Arc<SegmentMeta>,
    info: Arc<InfoSegment>,
    dpn_cache: Arc<DpnCache>,
}

impl FdState {
    fn new(name: &str, meta: SegmentMeta) -> SegmentResult<Self> {
        Ok(Self {
            info: Arc::new(InfoSegment::from_meta(name, &meta)?),
            dpn_cache: Arc::new(DpnCache::new(meta.column_infos.len())),
            meta: Arc::new(meta),
        })
    }
}

/// Descriptor of an integrated segment.
///
/// `SegmentFd` is `Send + Sync`; share it behind an `Arc` and call
/// [`open`](Self::open) from as many threads as needed.
///
/// The [`SegmentId`] is drawn from the allocator when the descriptor is
/// built. Two descriptors over the same file therefore get different ids and
/// never share entries in the block caches.
pub struct SegmentFd {
    segment_id: SegmentId,
    name: String,
    source: Arc<dyn ReadOpener>,
    state: RwLock<Option<Arc<FdState>>>,
}

impl SegmentFd {
    /// Creates a descriptor over `source`.
    ///
    /// With `parse_now`, the footer is read immediately and `Ok(None)` is
    /// returned if `source` is not an integrated segment. Otherwise the footer
    /// is read on first use, and a source that turns out not to be a segment
    /// makes that use fail with [`SegmentError::NotRecognized`].
    ///
    /// # Errors
    ///
    /// With `parse_now`, any error of [`integrate::read`].
    pub fn create(
        name: impl Into<String>,
        source: Arc<dyn ReadOpener>,
        ids: &SegmentIdAllocator,
        parse_now: bool,
    ) -> SegmentResult<Option<Self>> {
        let name = name.into();
        let state = if parse_now {
            match integrate::probe(source.as_ref())? {
                Some(meta) => Some(Arc::new(FdState::new(&name, meta)?)),
                None => {
                    debug!(name = %name, source = source.name(), "source is not an integrated segment");
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let fd = Self {
            segment_id: ids.next_id(),
            name,
            source,
            state: RwLock::new(state),
        };
        debug!(
            segment_id = %fd.segment_id,
            name = %fd.name,
            resolved = fd.is_resolved(),
            "segment descriptor created"
        );
        Ok(Some(fd))
    }

    /// Creates a descriptor from metadata that is already known.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::CorruptSegment`] if `meta` is internally
    /// inconsistent.
    pub fn with_meta(
        name: impl Into<String>,
        meta: SegmentMeta,
        source: Arc<dyn ReadOpener>,
        ids: &SegmentIdAllocator,
    ) -> SegmentResult<Self> {
        meta.validate()?;
        let name = name.into();
        let state = Arc::new(FdState::new(&name, meta)?);
        let fd = Self {
            segment_id: ids.next_id(),
            name,
            source,
            state: RwLock::new(Some(state)),
        };
        debug!(segment_id = %fd.segment_id, name = %fd.name, "segment descriptor created from metadata");
        Ok(fd)
    }

    /// Writes `segment` through `writer` and returns a descriptor reading the
    /// result through `source`.
    ///
    /// `source` must read what `writer` wrote.
    pub fn integrate(
        segment: &MemSegment,
        writer: &dyn WriteOpener,
        source: Arc<dyn ReadOpener>,
        ids: &SegmentIdAllocator,
    ) -> SegmentResult<Self> {
        let meta = integrate::write(segment, writer)?;
        Self::with_meta(segment.name(), meta, source, ids)
    }

    /// Writes `segment` to the file at `path` and returns a descriptor over it.
    ///
    /// An existing file is truncated.
    pub fn integrate_file(
        segment: &MemSegment,
        path: impl AsRef<Path>,
        ids: &SegmentIdAllocator,
    ) -> SegmentResult<Self> {
        let opener = Arc::new(FileOpener::new(path));
        Self::integrate(segment, opener.as_ref(), opener.clone(), ids)
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity used to namespace the block caches.
    #[must_use]
    pub const fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    /// The opener segments are read through.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn ReadOpener> {
        &self.source
    }

    /// Whether the footer has been read.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.read().is_some()
    }

    /// Segment metadata, reading the footer if it was deferred.
    pub fn meta(&self) -> SegmentResult<Arc<SegmentMeta>> {
        Ok(Arc::clone(&self.state()?.meta))
    }

    /// Pruning summary. Does not open a reader once metadata is known.
    pub fn info(&self) -> SegmentResult<Arc<InfoSegment>> {
        Ok(Arc::clone(&self.state()?.info))
    }

    /// Decoded pack nodes shared by every segment opened from this descriptor.
    pub fn dpn_cache(&self) -> SegmentResult<Arc<DpnCache>> {
        Ok(Arc::clone(&self.state()?.dpn_cache))
    }

    /// Opens the segment without shared caches.
    pub fn open(&self) -> SegmentResult<IntegratedSegment> {
        self.open_with(None)
    }

    /// Opens the segment reading index, extended index and pack blocks
    /// through `caches`.
    pub fn open_cached(&self, caches: &BlockCaches) -> SegmentResult<IntegratedSegment> {
        self.open_with(Some(caches))
    }

    /// Opens the segment, with or without shared caches.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NotRecognized`] if the footer was deferred and
    /// the source is not a segment, or [`SegmentError::Storage`] if the
    /// reader cannot be obtained.
    pub fn open_with(&self, caches: Option<&BlockCaches>) -> SegmentResult<IntegratedSegment> {
        let state = self.state()?;
        let reader = self.source.open(0)?;
        let segment = IntegratedSegment::new(
            self.segment_id,
            &self.name,
            &state.meta,
            reader,
            &state.dpn_cache,
            caches,
        )?;
        debug!(
            segment_id = %self.segment_id,
            name = %self.name,
            cached = caches.is_some(),
            "segment opened"
        );
        Ok(segment)
    }

    fn state(&self) -> SegmentResult<Arc<FdState>> {
        if let Some(state) = self.state.read().as_ref() {
            return Ok(Arc::clone(state));
        }

        let meta = integrate::probe(self.source.as_ref())?.ok_or_else(|| {
            SegmentError::NotRecognized {
                name: self.name.clone(),
            }
        })?;
        debug!(segment_id = %self.segment_id, name = %self.name, "deferred footer read");

        let fresh = Arc::new(FdState::new(&self.name, meta)?);
        let mut slot = self.state.write();
        Ok(Arc::clone(slot.get_or_insert(fresh)))
    }
}

impl fmt::Debug for SegmentFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentFd")
            .field("segment_id", &self.segment_id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
