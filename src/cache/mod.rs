//! Cache Module
//!
//! Provides a cache of async computations with age-based expiration,
//! LRU eviction and invalidation of failed computations.

mod arena;
mod entry;
mod handle;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use arena::EntryArena;
pub use entry::CacheEntry;
pub use handle::ResultHandle;
pub use lru::{Linked, Links, LruRecencyList};
pub use stats::CacheStats;
pub use store::AsyncResultCache;
