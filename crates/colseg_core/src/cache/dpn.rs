//! Per-descriptor cache of decoded DPN arrays.

use crate::dpn::DataPackNode;
use parking_lot::RwLock;
use std::sync::Arc;

/// Decoded DPN arrays of one segment, one slot per column.
///
/// Slots are filled on first access and never evicted. Two readers racing
/// on the same empty slot may both decode the column and both `put`; the
/// arrays are identical, so whichever write lands last is as good as the
/// other.
#[derive(Debug)]
pub struct DpnCache {
    slots: Vec<RwLock<Option<Arc<[DataPackNode]>>>>,
}

impl DpnCache {
    /// Creates an empty cache for `column_count` columns.
    #[must_use]
    pub fn new(column_count: usize) -> Self {
        Self {
            slots: (0..column_count).map(|_| RwLock::new(None)).collect(),
        }
    }

    /// Returns the cached array, or `None` if the column was never loaded or
    /// is out of range.
    #[must_use]
    pub fn get(&self, column_id: u32) -> Option<Arc<[DataPackNode]>> {
        self.slots
            .get(column_id as usize)
            .and_then(|slot| slot.read().clone())
    }

    /// Stores the array for a column. Out-of-range columns are ignored.
    pub fn put(&self, column_id: u32, dpns: Arc<[DataPackNode]>) {
        if let Some(slot) = self.slots.get(column_id as usize) {
            *slot.write() = Some(dpns);
        }
    }

    /// Number of column slots.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.slots.iter().filter(|s| s.read().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dpns(rows: u32) -> Arc<[DataPackNode]> {
        vec![
            DataPackNode {
                row_count: rows,
                ..DataPackNode::default()
            };
            2
        ]
        .into()
    }

    #[test]
    fn empty_until_put() {
        let cache = DpnCache::new(3);
        assert!(cache.get(1).is_none());

        cache.put(1, dpns(10));
        assert_eq!(cache.get(1).unwrap()[0].row_count, 10);
        assert_eq!(cache.loaded(), 1);
    }

    #[test]
    fn out_of_range_is_absent() {
        let cache = DpnCache::new(1);
        cache.put(5, dpns(1));
        assert!(cache.get(5).is_none());
        assert_eq!(cache.loaded(), 0);
    }

    #[test]
    fn repeated_put_of_equal_content_is_idempotent() {
        let cache = DpnCache::new(1);
        cache.put(0, dpns(42));
        let first = cache.get(0).unwrap();

        cache.put(0, dpns(42));
        let second = cache.get(0).unwrap();
        assert_eq!(&*first, &*second);
    }

    #[test]
    fn racing_first_population() {
        let cache = Arc::new(DpnCache::new(4));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.put(i % 4, dpns(7)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for column in 0..4 {
            assert_eq!(&*cache.get(column).unwrap(), &*dpns(7));
        }
    }
}
