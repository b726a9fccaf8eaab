//! Async Result Cache - demo
//!
//! Fires bursts of concurrent duplicate lookups at a simulated slow service
//! and reports how many underlying requests were actually made.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use async_result_cache::{AsyncResultCache, CacheConfig};

const USERS: u32 = 5;
const REQUESTS_PER_USER: usize = 20;

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache configuration from environment variables
/// 3. Build a cache over a simulated user lookup, failing for one user
/// 4. Issue concurrent duplicate lookups and await them all
/// 5. Log how many lookups reached the service and the cache statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "async_result_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_entries={:?}, max_age={:?}, sweep_period={:?}",
        config.max_entries, config.max_age, config.sweep_period
    );

    let service_calls = Arc::new(AtomicUsize::new(0));
    let calls = service_calls.clone();
    let cache = AsyncResultCache::with_producer(config, move |user_id: u32| {
        calls.fetch_add(1, Ordering::SeqCst);
        fetch_user(user_id)
    });

    for round in 1..=2 {
        let lookups = (0..USERS)
            .flat_map(|user_id| std::iter::repeat(user_id).take(REQUESTS_PER_USER))
            .map(|user_id| cache.get(format!("user:{user_id}"), user_id))
            .collect::<Result<Vec<_>, _>>()
            .context("cache lookup failed")?;

        let results = join_all(lookups).await;
        let failures = results.iter().filter(|result| result.is_err()).count();
        if failures > 0 {
            warn!("Round {}: {} lookups failed", round, failures);
        }

        // Let completion observers drop failed entries before the next round.
        tokio::task::yield_now().await;

        info!(
            "Round {}: {} lookups, {} service calls so far, {} cached entries",
            round,
            results.len(),
            service_calls.load(Ordering::SeqCst),
            cache.size()
        );
    }

    let stats = serde_json::to_string_pretty(&cache.stats()).context("serializing stats")?;
    info!("Cache statistics:\n{}", stats);

    cache.destroy();
    Ok(())
}

/// Pretends to load a user record from a remote service. User 0 always fails.
async fn fetch_user(user_id: u32) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if user_id == 0 {
        Err(format!("user {user_id} unavailable"))
    } else {
        Ok(format!("User #{user_id}"))
    }
}
