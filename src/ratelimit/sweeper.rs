//! Background eviction of expired rate limit records.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn a task that sweeps `limiter` every `interval` until `shutdown` resolves.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_sweeper<F>(limiter: Arc<RateLimiter>, interval: Duration, shutdown: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Starting rate limit sweeper");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let removed = limiter.sweep_expired();
                    debug!(removed, tracked = limiter.len(), "Sweep finished");
                }
            }
        }

        info!("Rate limit sweeper stopped");
    })
}
