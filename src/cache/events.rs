//! Cache event system.
//!
//! Write operations publish events here; the consumer drains them and marks
//! derived views stale.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use uuid::Uuid;

use crate::domain::entities::UserId;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Monotonic per-process event sequence number.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A post was persisted; every assembled feed view is now stale.
    PostCreated { post_id: Uuid, author_id: UserId },
}

#[derive(Default)]
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, kind: EventKind) {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let event = CacheEvent::new(kind, epoch);

        info!(
            target = SOURCE,
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "cache event enqueued"
        );

        mutex_lock(&self.queue, SOURCE, "publish").push_back(event);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
