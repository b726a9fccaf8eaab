//! Error types for the result cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised synchronously by cache lookups.
///
/// A computation settling with its own error is not a `CacheError`; it
/// invalidates the entry instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// `get` was called on a cache constructed without a producer
    #[error("no producer configured; use get_with to supply one for this call")]
    MissingProducer,

    /// No execution context to drive the computation on
    #[error("no tokio runtime configured or current")]
    NoRuntime,

    /// The cache was destroyed and must not be used for lookups
    #[error("cache has been destroyed")]
    Destroyed,
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
