//! Cache configuration.

/// Capacities of the shared block caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Byte budget of the index block cache.
    pub index_capacity: usize,

    /// Byte budget of the extended index block cache.
    pub ext_index_capacity: usize,

    /// Byte budget of the pack block cache.
    pub pack_capacity: usize,

    /// Number of independently locked shards per cache.
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_capacity: 16 * 1024 * 1024,     // 16 MB
            ext_index_capacity: 16 * 1024 * 1024, // 16 MB
            pack_capacity: 256 * 1024 * 1024,     // 256 MB
            shards: 16,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the index cache budget.
    #[must_use]
    pub const fn index_capacity(mut self, bytes: usize) -> Self {
        self.index_capacity = bytes;
        self
    }

    /// Sets the extended index cache budget.
    #[must_use]
    pub const fn ext_index_capacity(mut self, bytes: usize) -> Self {
        self.ext_index_capacity = bytes;
        self
    }

    /// Sets the pack cache budget.
    #[must_use]
    pub const fn pack_capacity(mut self, bytes: usize) -> Self {
        self.pack_capacity = bytes;
        self
    }

    /// Sets the shard count. Zero is treated as one.
    #[must_use]
    pub const fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.shards, 16);
        assert!(config.pack_capacity > config.index_capacity);
    }

    #[test]
    fn builder_pattern() {
        let config = CacheConfig::new()
            .index_capacity(1024)
            .pack_capacity(4096)
            .shards(2);

        assert_eq!(config.index_capacity, 1024);
        assert_eq!(config.pack_capacity, 4096);
        assert_eq!(config.shards, 2);
    }
}
