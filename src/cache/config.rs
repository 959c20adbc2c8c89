//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_MINUTES: u64 = 5;
const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_FEED_VIEW_LIMIT: usize = 16;

/// Runtime knobs for the author cache and the feed view cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a resolved author stays fresh. Also bounds feed view age.
    pub ttl: Duration,
    /// Maximum authors held before least-recently-used eviction.
    pub max_entries: usize,
    /// Interval of the background sweep and event drain.
    pub sweep_interval: Duration,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Maximum distinct feed limits kept as assembled views.
    pub feed_view_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_MINUTES * 60),
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            feed_view_limit: DEFAULT_FEED_VIEW_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(u64::from(settings.ttl_minutes.get()) * 60),
            max_entries: settings.max_entries.get() as usize,
            sweep_interval: Duration::from_secs(u64::from(settings.sweep_interval_seconds.get())),
            ..Self::default()
        }
    }
}

impl CacheConfig {
    /// Returns the author capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the feed view capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn feed_view_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.feed_view_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
