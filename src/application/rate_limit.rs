use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::entities::UserId;

/// Fixed-window post counter per author.
///
/// The check and the increment happen under the author's shard lock, so
/// concurrent creates by one author cannot both take the last slot.
#[derive(Debug, Clone)]
pub struct PostRateLimiter {
    window: Duration,
    max_posts: u32,
    counters: Arc<DashMap<UserId, RateLimitCounter>>,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitCounter {
    window_start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl PostRateLimiter {
    pub fn new(window: Duration, max_posts: u32) -> Self {
        Self {
            window,
            max_posts,
            counters: Arc::new(DashMap::new()),
        }
    }

    /// Count one attempt for `author`. Rejections leave the counter as is.
    pub fn check(&self, author: &UserId) -> RateDecision {
        let now = Instant::now();
        let mut counter = self
            .counters
            .entry(author.clone())
            .or_insert(RateLimitCounter {
                window_start: now,
                count: 0,
            });

        let elapsed = now.saturating_duration_since(counter.window_start);
        if elapsed >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= self.max_posts {
            let elapsed = now.saturating_duration_since(counter.window_start);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        counter.count += 1;
        RateDecision::Allowed {
            remaining: self.max_posts - counter.count,
        }
    }

    /// Drop counters whose window elapsed. Returns how many were removed.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now.saturating_duration_since(counter.window_start) < self.window);
        before.saturating_sub(self.counters.len())
    }
}
