//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache holds entries.
//!
//! # Tasks
//! - Expiration Sweep: Prunes expired cache entries at the configured period

mod sweep;

pub use sweep::spawn_sweep_task;
