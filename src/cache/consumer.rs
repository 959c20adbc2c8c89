//! Cache consumer.
//!
//! Drains events from the queue and applies them to the derived views.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::{EventKind, EventQueue};
use super::feed_views::FeedViewStore;

const METRIC_CACHE_CONSUME_MS: &str = "chirp_cache_consume_ms";

pub struct CacheConsumer {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    feed_views: Arc<FeedViewStore>,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, feed_views: Arc<FeedViewStore>) -> Self {
        Self {
            config,
            queue,
            feed_views,
        }
    }

    /// Consume pending events. Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        let feed_stale = events
            .iter()
            .any(|event| matches!(event.kind, EventKind::PostCreated { .. }));

        let generation = feed_stale.then(|| self.feed_views.mark_stale());

        debug!(
            event_count = event_ids.len(),
            event_ids = ?event_ids,
            feed_generation = ?generation,
            "cache events consumed"
        );

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }
}
