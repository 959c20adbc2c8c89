//! In-process caches.
//!
//! - **Author cache**: identity records by user id, TTL-bounded, single-flight
//!   batch fetches.
//! - **Feed views**: assembled feeds by limit, invalidated by write events.
//! - **Profile snapshots**: rendered profile pages by username.
//!
//! Write paths publish [`EventKind`]s through the [`CacheTrigger`]; the
//! [`CacheConsumer`] applies them to the views.

mod authors;
mod config;
mod consumer;
mod events;
mod feed_views;
pub(crate) mod flight;
pub(crate) mod lock;
mod snapshots;
mod trigger;

pub use authors::{AuthorCache, ResolvedAuthors};
pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use feed_views::{FeedViewStore, Generation};
pub use flight::{FlightError, SharedFlight, spawn_shared};
pub use snapshots::{ProfileSnapshot, SnapshotState, SnapshotStore};
pub use trigger::CacheTrigger;
