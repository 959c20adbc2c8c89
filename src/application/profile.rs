//! Profile page regeneration.
//!
//! Pages are served from rendered snapshots. A missing snapshot blocks the
//! caller on a regeneration; a stale one is served immediately while a
//! background regeneration refreshes it. Either way at most one
//! regeneration per username runs at a time and late callers attach to it.
//!
//! Lock order is `in_flight` before the snapshot store.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::application::identity::{IdentityError, IdentityProvider};
use crate::cache::lock::mutex_lock;
use crate::cache::{
    AuthorCache, FlightError, ProfileSnapshot, SharedFlight, SnapshotState, SnapshotStore,
    spawn_shared,
};
use crate::domain::profiles::normalize_username;
use crate::presentation::views::render_profile;

const SOURCE: &str = "application::profile";

const METRIC_SNAPSHOT: &str = "chirp_profile_snapshot_total";
const METRIC_REGENERATION: &str = "chirp_profile_regeneration_total";

#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Upstream(#[from] IdentityError),
    #[error("profile rendering failed: {0}")]
    Render(String),
    #[error(transparent)]
    Aborted(#[from] FlightError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilePage {
    Found(Arc<ProfileSnapshot>),
    NotFound,
}

type RegenOutcome = Result<Option<Arc<ProfileSnapshot>>, ProfileError>;

#[derive(Debug, Clone, Copy)]
pub struct ProfileSettings {
    pub revalidate_after: Duration,
    pub max_snapshots: NonZeroUsize,
}

struct Regenerator {
    identity: Arc<dyn IdentityProvider>,
    authors: Option<Arc<AuthorCache>>,
    snapshots: SnapshotStore,
    in_flight: Mutex<HashMap<String, SharedFlight<RegenOutcome>>>,
}

#[derive(Clone)]
pub struct ProfileService {
    inner: Arc<Regenerator>,
}

impl ProfileService {
    /// With `authors` set, every successful regeneration also seeds the
    /// author cache with the fetched record.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        authors: Option<Arc<AuthorCache>>,
        settings: ProfileSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Regenerator {
                identity,
                authors,
                snapshots: SnapshotStore::new(settings.max_snapshots, settings.revalidate_after),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[instrument(skip(self))]
    pub async fn serve(&self, raw_username: &str) -> Result<ProfilePage, ProfileError> {
        let Some(username) = normalize_username(raw_username) else {
            return Ok(ProfilePage::NotFound);
        };

        let flight = {
            let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "serve.in_flight");
            match self.inner.snapshots.lookup(&username) {
                SnapshotState::Fresh(snapshot) => {
                    counter!(METRIC_SNAPSHOT, "state" => "fresh").increment(1);
                    return Ok(ProfilePage::Found(snapshot));
                }
                SnapshotState::Stale(snapshot) => {
                    counter!(METRIC_SNAPSHOT, "state" => "stale").increment(1);
                    if !in_flight.contains_key(&username) {
                        debug!(username = %username, "stale profile; regenerating in background");
                        let flight = self.start(&username);
                        in_flight.insert(username, flight);
                    }
                    return Ok(ProfilePage::Found(snapshot));
                }
                SnapshotState::Missing => {
                    counter!(METRIC_SNAPSHOT, "state" => "missing").increment(1);
                    in_flight
                        .entry(username.clone())
                        .or_insert_with(|| self.start(&username))
                        .clone()
                }
            }
        };

        match flight.await? {
            Ok(Some(snapshot)) => Ok(ProfilePage::Found(snapshot)),
            Ok(None) => Ok(ProfilePage::NotFound),
            Err(err) => Err(err),
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.snapshots.len()
    }

    /// Caller must hold the `in_flight` lock and register the returned
    /// flight under `username` before releasing it.
    fn start(&self, username: &str) -> SharedFlight<RegenOutcome> {
        let inner = self.inner.clone();
        let username = username.to_string();
        spawn_shared(async move { inner.regenerate(username).await })
    }
}

impl Regenerator {
    async fn regenerate(&self, username: String) -> RegenOutcome {
        counter!(METRIC_REGENERATION).increment(1);
        let outcome = match self.identity.get_by_username(&username).await {
            Ok(Some(record)) => match render_profile(&record) {
                Ok(html) => {
                    if let Some(authors) = &self.authors {
                        authors.prime(&record);
                    }
                    Ok(Some(Arc::new(ProfileSnapshot {
                        username: username.clone(),
                        html,
                        generated_at: Instant::now(),
                    })))
                }
                Err(err) => {
                    warn!(username = %username, error = %err, "profile render failed");
                    Err(ProfileError::Render(err.to_string()))
                }
            },
            Ok(None) => {
                info!(username = %username, "profile not found");
                Ok(None)
            }
            Err(err) => {
                warn!(username = %username, error = %err, "profile lookup failed; keeping previous snapshot");
                Err(ProfileError::Upstream(err))
            }
        };

        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "regenerate.in_flight");
        match &outcome {
            Ok(Some(snapshot)) => self.snapshots.insert(snapshot.clone()),
            Ok(None) => {
                self.snapshots.remove(&username);
            }
            Err(_) => {}
        }
        in_flight.remove(&username);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures::future::join_all;

    use super::*;
    use crate::application::testing::FakeIdentity;
    use crate::cache::CacheConfig;
    use crate::domain::entities::UserId;

    fn settings(revalidate_secs: u64) -> ProfileSettings {
        ProfileSettings {
            revalidate_after: Duration::from_secs(revalidate_secs),
            max_snapshots: NonZeroUsize::MIN.saturating_add(99),
        }
    }

    #[tokio::test]
    async fn first_request_blocks_and_returns_page() {
        let identity = Arc::new(FakeIdentity::with_users(&["alice"]));
        let service = ProfileService::new(identity.clone(), None, settings(60));

        let page = service.serve("@alice").await.expect("page");

        let ProfilePage::Found(snapshot) = page else {
            panic!("expected a page");
        };
        assert_eq!(snapshot.username, "alice");
        assert!(snapshot.html.contains("@alice"));
        assert_eq!(service.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_lookup() {
        let identity = Arc::new(
            FakeIdentity::with_users(&["bob"]).with_delay(Duration::from_millis(20)),
        );
        let service = ProfileService::new(identity.clone(), None, settings(60));

        let pages = join_all((0..5).map(|_| service.serve("bob"))).await;

        assert!(pages.iter().all(|page| matches!(page, Ok(ProfilePage::Found(_)))));
        assert_eq!(identity.username_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_not_cached() {
        let identity = Arc::new(FakeIdentity::with_users(&[]));
        let service = ProfileService::new(identity.clone(), None, settings(60));

        assert_eq!(service.serve("ghost").await.expect("ok"), ProfilePage::NotFound);
        assert_eq!(service.serve("ghost").await.expect("ok"), ProfilePage::NotFound);

        assert_eq!(identity.username_calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.snapshot_count(), 0);
    }

    #[tokio::test]
    async fn empty_username_is_not_found_without_lookup() {
        let identity = Arc::new(FakeIdentity::with_users(&[]));
        let service = ProfileService::new(identity.clone(), None, settings(60));

        assert_eq!(service.serve("@").await.expect("ok"), ProfilePage::NotFound);
        assert_eq!(identity.username_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_snapshot_is_served_without_lookup() {
        let identity = Arc::new(FakeIdentity::with_users(&["carol"]));
        let service = ProfileService::new(identity.clone(), None, settings(60));

        service.serve("carol").await.expect("page");
        tokio::time::advance(Duration::from_secs(30)).await;
        service.serve("carol").await.expect("page");

        assert_eq!(identity.username_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_is_served_while_refreshing() {
        let identity = Arc::new(
            FakeIdentity::with_users(&["dave"]).with_delay(Duration::from_millis(10)),
        );
        let service = ProfileService::new(identity.clone(), None, settings(60));

        let ProfilePage::Found(first) = service.serve("dave").await.expect("page") else {
            panic!("expected a page");
        };
        tokio::time::advance(Duration::from_secs(61)).await;

        let ProfilePage::Found(stale) = service.serve("dave").await.expect("page") else {
            panic!("expected a page");
        };
        assert!(Arc::ptr_eq(&first, &stale));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let ProfilePage::Found(refreshed) = service.serve("dave").await.expect("page") else {
            panic!("expected a page");
        };
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(identity.username_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_user_drops_stale_snapshot() {
        let identity = Arc::new(FakeIdentity::with_users(&["erin"]));
        let service = ProfileService::new(identity.clone(), None, settings(60));
        service.serve("erin").await.expect("page");

        identity.remove_user("erin");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(service.serve("erin").await, Ok(ProfilePage::Found(_))));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.serve("erin").await.expect("ok"), ProfilePage::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_keeps_stale_snapshot() {
        let identity = Arc::new(FakeIdentity::with_users(&["fay"]));
        let service = ProfileService::new(identity.clone(), None, settings(60));
        service.serve("fay").await.expect("page");

        identity.set_unavailable(true);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(service.serve("fay").await, Ok(ProfilePage::Found(_))));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(service.serve("fay").await, Ok(ProfilePage::Found(_))));
        assert_eq!(service.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_without_snapshot_is_an_error() {
        let identity = Arc::new(FakeIdentity::with_users(&["gus"]));
        identity.set_unavailable(true);
        let service = ProfileService::new(identity, None, settings(60));

        let result = service.serve("gus").await;

        assert!(matches!(result, Err(ProfileError::Upstream(_))));
    }

    #[tokio::test]
    async fn regeneration_primes_author_cache() {
        let identity = Arc::new(FakeIdentity::with_users(&["hal"]));
        let authors = Arc::new(AuthorCache::new(identity.clone(), &CacheConfig::default()));
        let service = ProfileService::new(identity.clone(), Some(authors.clone()), settings(60));

        service.serve("hal").await.expect("page");
        let record = authors.resolve_one(&UserId::from("hal")).await;

        assert!(record.is_some());
        assert!(identity.batches().is_empty());
    }
}
