//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use tracing::warn;

/// Default period between background expiration sweeps.
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Cache configuration parameters.
///
/// Fixed for the lifetime of a cache. All values can be configured via
/// environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries; the least recently used entry is evicted
    /// once this is exceeded. `None` = unbounded
    pub max_entries: Option<NonZeroUsize>,
    /// How long an entry is served after its creation. `None` = forever
    pub max_age: Option<Duration>,
    /// How often expired entries are swept in the background. Only used
    /// together with `max_age`. `None` = no background sweep
    pub sweep_period: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: unbounded, `0` = unbounded)
    /// - `CACHE_MAX_AGE_MS` - Entry lifetime in milliseconds (default: no expiry)
    /// - `CACHE_SWEEP_PERIOD_MS` - Sweep frequency in milliseconds (default: 60000, `0` = disabled)
    pub fn from_env() -> Self {
        let max_entries = env_u64("CACHE_MAX_ENTRIES").and_then(parse_max_entries);
        let sweep_period = match env_u64("CACHE_SWEEP_PERIOD_MS") {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(DEFAULT_SWEEP_PERIOD),
        };

        Self {
            max_entries,
            max_age: env_u64("CACHE_MAX_AGE_MS").map(Duration::from_millis),
            sweep_period,
        }
    }

    /// Bounds the cache to `max` entries.
    ///
    /// # Panics
    /// Panics if `max` is zero; a cache must be able to hold its newest entry.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(NonZeroUsize::new(max).expect("max_entries must be at least 1"));
        self
    }

    /// Expires entries once they are older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets the background sweep period. A zero period disables the sweep.
    pub fn with_sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = (!period.is_zero()).then_some(period);
        self
    }

    /// Disables the background sweep; expired entries are then only dropped
    /// by explicit `prune`/`size` calls or when their key is requested again.
    pub fn without_sweep(mut self) -> Self {
        self.sweep_period = None;
        self
    }

    /// The sweep period, if a background sweep should run while entries exist.
    pub fn effective_sweep_period(&self) -> Option<Duration> {
        self.max_age.and(self.sweep_period)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            max_age: None,
            sweep_period: Some(DEFAULT_SWEEP_PERIOD),
        }
    }
}

fn parse_max_entries(max: u64) -> Option<NonZeroUsize> {
    let parsed = usize::try_from(max).ok().and_then(NonZeroUsize::new);
    if parsed.is_none() {
        warn!("CACHE_MAX_ENTRIES={} is unsupported, leaving the cache unbounded", max);
    }
    parsed
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
