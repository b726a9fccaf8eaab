//! Expiration Sweep Task
//!
//! Background task that periodically prunes expired cache entries.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Spawns a task on `runtime` that calls `prune` every `period`.
///
/// `prune` returns the number of entries it removed, or `None` once the
/// cache it prunes is gone, which ends the task. The first run happens one
/// full period after this call.
///
/// # Returns
/// A JoinHandle for the spawned task, which the cache aborts once it no
/// longer holds entries that can expire. `None` if `period` is too long
/// for the clock to ever reach its first run, in which case nothing is
/// spawned.
pub fn spawn_sweep_task<F>(
    runtime: &Handle,
    period: Duration,
    mut prune: F,
) -> Option<JoinHandle<()>>
where
    F: FnMut() -> Option<usize> + Send + 'static,
{
    // Deadline is fixed here, not when the task first gets polled.
    let mut ticks = {
        let _guard = runtime.enter();
        let Some(start) = Instant::now().checked_add(period) else {
            debug!("Sweep period of {:?} is out of range, not sweeping", period);
            return None;
        };
        time::interval_at(start, period)
    };
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    Some(runtime.spawn(async move {
        debug!("Starting expiration sweep with period of {:?}", period);

        loop {
            ticks.tick().await;

            match prune() {
                Some(0) => debug!("Expiration sweep: no expired entries found"),
                Some(removed) => info!("Expiration sweep: removed {} expired entries", removed),
                None => {
                    debug!("Expiration sweep: cache dropped, stopping");
                    break;
                }
            }
        }
    }))
}
