//! Synchronization settings.

use std::time::Duration;

/// Settings shared by the cache and the optimistic controller.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a fetched value is served without refetching.
    pub stale_time: Duration,
    /// How long an unobserved entry survives garbage collection.
    pub gc_time: Duration,
    /// Upper bound on a single fetch, retries included.
    pub fetch_timeout: Duration,
    /// Delay before re-reading the authoritative source after a toggle settles.
    pub refresh_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(60),
            refresh_delay: Duration::from_millis(300),
        }
    }
}
