//! Cache trigger service.
//!
//! Publishes cache events from write operations and optionally consumes them
//! right away.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entities::UserId;

use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

pub struct CacheTrigger {
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self { queue, consumer }
    }

    /// Publish an event. With `consume_now` unset the event waits for the
    /// background drain or the next explicit consumption.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) {
        self.queue.publish(kind);
        if consume_now {
            self.consumer.consume();
        }
    }

    pub fn post_created(&self, post_id: Uuid, author_id: &UserId) {
        self.trigger(
            EventKind::PostCreated {
                post_id,
                author_id: author_id.clone(),
            },
            true,
        );
    }
}
