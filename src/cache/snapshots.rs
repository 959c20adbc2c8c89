//! Rendered profile snapshots keyed by normalized username.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::snapshots";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub username: String,
    pub html: String,
    pub generated_at: Instant,
}

/// Freshness of a snapshot at lookup time.
#[derive(Debug, Clone)]
pub enum SnapshotState {
    Fresh(Arc<ProfileSnapshot>),
    Stale(Arc<ProfileSnapshot>),
    Missing,
}

pub struct SnapshotStore {
    entries: Mutex<LruCache<String, Arc<ProfileSnapshot>>>,
    revalidate_after: Duration,
}

impl SnapshotStore {
    pub fn new(capacity: NonZeroUsize, revalidate_after: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            revalidate_after,
        }
    }

    pub fn lookup(&self, username: &str) -> SnapshotState {
        let mut entries = mutex_lock(&self.entries, SOURCE, "lookup");
        match entries.get(username) {
            Some(snapshot) if snapshot.generated_at.elapsed() < self.revalidate_after => {
                SnapshotState::Fresh(snapshot.clone())
            }
            Some(snapshot) => SnapshotState::Stale(snapshot.clone()),
            None => SnapshotState::Missing,
        }
    }

    pub fn insert(&self, snapshot: Arc<ProfileSnapshot>) {
        mutex_lock(&self.entries, SOURCE, "insert").put(snapshot.username.clone(), snapshot);
    }

    pub fn remove(&self, username: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "remove")
            .pop(username)
            .is_some()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
