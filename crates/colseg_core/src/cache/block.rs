//! Shared caches of raw index, extended index and pack blocks.
//!
//! Each cache is split into shards, each an LRU list with its own byte
//! budget behind its own lock. A key always maps to the same shard, so
//! lookups of unrelated keys only contend when they hash together.
//!
//! Blocks are [`Bytes`]: a `get` hands out a reference-counted view, and
//! evicting the entry later only drops the cache's own reference.

use crate::config::CacheConfig;
use crate::types::SegmentId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Key of one cached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// Descriptor the block was read through.
    pub segment_id: SegmentId,
    /// Column within the segment.
    pub column_id: u32,
    /// Pack within the column.
    pub pack_id: u32,
}

impl BlockKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(segment_id: SegmentId, column_id: u32, pack_id: u32) -> Self {
        Self {
            segment_id,
            column_id,
            pack_id,
        }
    }
}

struct Entry {
    key: BlockKey,
    block: Bytes,
    prev: Option<usize>,
    next: Option<usize>,
}

/// One LRU list. Entries live in a slab; `head` is the most recently used.
struct Shard {
    capacity: usize,
    bytes: usize,
    map: HashMap<BlockKey, usize>,
    entries: Vec<Option<Entry>>,
    free_list: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bytes: 0,
            map: HashMap::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn get(&mut self, key: &BlockKey) -> Option<Bytes> {
        let index = *self.map.get(key)?;
        self.move_to_front(index);
        self.entries[index].as_ref().map(|e| e.block.clone())
    }

    /// Inserts or replaces; returns the number of entries evicted.
    fn put(&mut self, key: BlockKey, block: Bytes) -> u64 {
        if let Some(&index) = self.map.get(&key) {
            if let Some(entry) = &mut self.entries[index] {
                self.bytes = self.bytes - entry.block.len() + block.len();
                entry.block = block;
            }
            self.move_to_front(index);
        } else {
            self.bytes += block.len();
            let index = self.allocate(Entry {
                key,
                block,
                prev: None,
                next: None,
            });
            self.map.insert(key, index);
            self.push_front(index);
        }

        let mut evicted = 0;
        while self.bytes > self.capacity {
            let Some(tail) = self.tail else { break };
            if let Some(entry) = self.remove_at(tail) {
                trace!(key = ?entry.key, bytes = entry.block.len(), "block evicted");
            }
            evicted += 1;
        }
        evicted
    }

    fn remove_segment(&mut self, segment_id: SegmentId) -> usize {
        let doomed: Vec<usize> = self
            .map
            .iter()
            .filter(|(key, _)| key.segment_id == segment_id)
            .map(|(_, &index)| index)
            .collect();
        for &index in &doomed {
            self.remove_at(index);
        }
        doomed.len()
    }

    fn remove_at(&mut self, index: usize) -> Option<Entry> {
        self.unlink(index);
        let entry = self.entries[index].take()?;
        self.map.remove(&entry.key);
        self.free_list.push(index);
        self.bytes -= entry.block.len();
        Some(entry)
    }

    fn allocate(&mut self, entry: Entry) -> usize {
        if let Some(index) = self.free_list.pop() {
            self.entries[index] = Some(entry);
            index
        } else {
            self.entries.push(Some(entry));
            self.entries.len() - 1
        }
    }

    fn push_front(&mut self, index: usize) {
        if let Some(entry) = &mut self.entries[index] {
            entry.prev = None;
            entry.next = self.head;
        }

        if let Some(old_head) = self.head {
            if let Some(entry) = &mut self.entries[old_head] {
                entry.prev = Some(index);
            }
        }

        self.head = Some(index);

        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = match &self.entries[index] {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(prev_index) => {
                if let Some(entry) = &mut self.entries[prev_index] {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_index) => {
                if let Some(entry) = &mut self.entries[next_index] {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.push_front(index);
    }
}

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCacheStats {
    /// Lookups that found a block.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Blocks dropped to stay within budget.
    pub evictions: u64,
}

/// Smallest budget a shard is given; small caches get fewer shards instead.
const MIN_SHARD_BYTES: usize = 4096;

/// A bounded, sharded LRU cache of immutable blocks.
pub struct BlockCache {
    name: &'static str,
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` bytes across up to
    /// `shards` shards.
    ///
    /// The shard count is reduced so every shard gets at least 4 KiB, or the
    /// whole capacity when that is smaller.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize, shards: usize) -> Self {
        let requested = shards.max(1);
        let shards = requested.min((capacity / MIN_SHARD_BYTES).max(1));
        if shards < requested {
            debug!(cache = name, capacity, requested, shards, "shard count reduced");
        }
        let per_shard = capacity / shards;
        Self {
            name,
            shards: (0..shards).map(|_| Mutex::new(Shard::new(per_shard))).collect(),
            hasher: RandomState::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &BlockKey) -> &Mutex<Shard> {
        let hash = self.hasher.hash_one(key);
        &self.shards[(hash % self.shards.len() as u64) as usize]
    }

    /// Returns the block stored under `key`, if still cached.
    pub fn get(&self, key: &BlockKey) -> Option<Bytes> {
        let found = self.shard(key).lock().get(key);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Stores `block` under `key`, evicting least recently used blocks of the
    /// same shard as needed.
    ///
    /// A block larger than a shard's budget is not stored.
    pub fn put(&self, key: BlockKey, block: Bytes) {
        let shard = self.shard(&key);
        let mut shard = shard.lock();
        if block.len() > shard.capacity {
            drop(shard);
            warn!(
                cache = self.name,
                key = ?key,
                bytes = block.len(),
                "block larger than cache shard, not cached"
            );
            return;
        }
        let evicted = shard.put(key, block);
        drop(shard);
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Drops every block of one segment. Returns how many were dropped.
    pub fn remove_segment(&self, segment_id: SegmentId) -> usize {
        let removed = self
            .shards
            .iter()
            .map(|shard| shard.lock().remove_segment(segment_id))
            .sum();
        trace!(cache = self.name, %segment_id, removed, "segment blocks dropped");
        removed
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().map.len()).sum()
    }

    /// Number of independently locked shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of cached blocks.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.shards.iter().map(|s| s.lock().bytes).sum()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BlockCacheStats {
        BlockCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// The three shared caches handed to [`crate::SegmentFd::open_cached`].
#[derive(Debug, Clone)]
pub struct BlockCaches {
    /// Per-pack index blocks.
    pub index: Arc<BlockCache>,
    /// Per-pack extended index blocks.
    pub ext_index: Arc<BlockCache>,
    /// Pack data blocks.
    pub pack: Arc<BlockCache>,
}

impl BlockCaches {
    /// Creates the three caches from a configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            index: Arc::new(BlockCache::new("index", config.index_capacity, config.shards)),
            ext_index: Arc::new(BlockCache::new(
                "ext_index",
                config.ext_index_capacity,
                config.shards,
            )),
            pack: Arc::new(BlockCache::new("pack", config.pack_capacity, config.shards)),
        }
    }

    /// Drops every block of one segment from all three caches.
    pub fn remove_segment(&self, segment_id: SegmentId) -> usize {
        self.index.remove_segment(segment_id)
            + self.ext_index.remove_segment(segment_id)
            + self.pack.remove_segment(segment_id)
    }
}

impl Default for BlockCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
