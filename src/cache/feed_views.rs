//! Assembled feed views keyed by effective limit.
//!
//! Invalidation is lazy: `mark_stale` bumps a generation counter and views
//! built under an older generation are ignored and rebuilt on the next read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::domain::entities::EnrichedPost;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::feed_views";

pub type Generation = u64;

#[derive(Debug, Clone)]
struct FeedView {
    posts: Arc<Vec<EnrichedPost>>,
    generation: Generation,
    built_at: Instant,
}

pub struct FeedViewStore {
    views: Mutex<LruCache<u32, FeedView>>,
    generation: AtomicU64,
    ttl: Duration,
}

impl FeedViewStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            views: Mutex::new(LruCache::new(config.feed_view_limit_non_zero())),
            generation: AtomicU64::new(0),
            ttl: config.ttl,
        }
    }

    /// Generation to capture before loading posts for a new view.
    pub fn generation(&self) -> Generation {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get(&self, limit: u32) -> Option<Arc<Vec<EnrichedPost>>> {
        let current = self.generation();
        let mut views = mutex_lock(&self.views, SOURCE, "get");
        match views.get(&limit) {
            Some(view)
                if view.generation == current && view.built_at.elapsed() < self.ttl =>
            {
                Some(view.posts.clone())
            }
            Some(_) => {
                views.pop(&limit);
                None
            }
            None => None,
        }
    }

    /// Store a view built from data read under `generation`.
    ///
    /// A write that landed while the view was being assembled has already
    /// bumped the generation, so such a view is never served.
    pub fn put(&self, limit: u32, generation: Generation, posts: Arc<Vec<EnrichedPost>>) {
        let view = FeedView {
            posts,
            generation,
            built_at: Instant::now(),
        };
        mutex_lock(&self.views, SOURCE, "put").put(limit, view);
    }

    pub fn mark_stale(&self) -> Generation {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.views, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
