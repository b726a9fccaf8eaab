//! Async Result Cache - A cache of in-flight and completed computations
//!
//! Concurrent requests for the same key share one computation. Entries can
//! expire by age, are evicted on an LRU basis, and are dropped when their
//! computation fails.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{AsyncResultCache, CacheStats, ResultHandle};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
