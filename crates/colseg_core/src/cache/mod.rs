//! Caches layered under the active segment.
//!
//! - [`DpnCache`]: decoded pack nodes, one per descriptor, never evicted.
//! - [`BlockCache`]: raw index, extended index and pack blocks, shared by
//!   every descriptor and namespaced by [`BlockKey::segment_id`].

mod block;
mod dpn;

pub use block::{BlockCache, BlockCacheStats, BlockCaches, BlockKey};
pub use dpn::DpnCache;
