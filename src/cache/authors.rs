//! Author enrichment cache.
//!
//! Memoizes identity records by user id with a TTL and a size bound. Each
//! `resolve` splits its ids into fresh hits, ids already being fetched by
//! someone else, and cold ids. Cold ids go upstream in a single batch call
//! whose result every concurrent waiter shares.
//!
//! Lock order is `in_flight` before `entries`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::identity::{IdentityError, IdentityProvider};
use crate::domain::entities::{IdentityRecord, UserId};

use super::config::CacheConfig;
use super::flight::{SharedFlight, spawn_shared};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::authors";

const METRIC_HIT: &str = "chirp_author_cache_hit_total";
const METRIC_MISS: &str = "chirp_author_cache_miss_total";
const METRIC_UPSTREAM_BATCH: &str = "chirp_author_cache_upstream_batch_total";
const METRIC_EVICT: &str = "chirp_author_cache_evict_total";

type BatchOutcome = Result<Arc<HashMap<UserId, IdentityRecord>>, IdentityError>;

#[derive(Debug, Clone)]
struct CacheEntry {
    record: IdentityRecord,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

struct AuthorState {
    entries: Mutex<LruCache<UserId, CacheEntry>>,
    in_flight: Mutex<HashMap<UserId, SharedFlight<BatchOutcome>>>,
    ttl: Duration,
}

impl AuthorState {
    fn store(&self, requested: &[UserId], records: &HashMap<UserId, IdentityRecord>) {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "store.entries");
        for id in requested {
            let Some(record) = records.get(id) else {
                continue;
            };
            let entry = CacheEntry {
                record: record.clone(),
                inserted_at: now,
            };
            if let Some((evicted, _)) = entries.push(id.clone(), entry)
                && &evicted != id
            {
                counter!(METRIC_EVICT, "reason" => "capacity").increment(1);
            }
        }
    }
}

/// Partial result of a resolve call.
#[derive(Debug, Default, Clone)]
pub struct ResolvedAuthors {
    pub found: HashMap<UserId, IdentityRecord>,
    /// Ids the provider did not return or could not be reached for. Never
    /// negatively cached.
    pub unresolved: HashSet<UserId>,
}

pub struct AuthorCache {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<AuthorState>,
}

impl AuthorCache {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &CacheConfig) -> Self {
        Self {
            provider,
            state: Arc::new(AuthorState {
                entries: Mutex::new(LruCache::new(config.max_entries_non_zero())),
                in_flight: Mutex::new(HashMap::new()),
                ttl: config.ttl,
            }),
        }
    }

    /// Resolve identities for `ids`, issuing at most one upstream batch call.
    pub async fn resolve(&self, ids: &[UserId]) -> ResolvedAuthors {
        let mut resolved = ResolvedAuthors::default();
        let mut waits: Vec<(UserId, SharedFlight<BatchOutcome>)> = Vec::new();

        {
            let mut in_flight = mutex_lock(&self.state.in_flight, SOURCE, "resolve.in_flight");
            let mut cold: Vec<UserId> = Vec::new();
            let mut seen: HashSet<&UserId> = HashSet::with_capacity(ids.len());
            let now = Instant::now();

            {
                let mut entries = mutex_lock(&self.state.entries, SOURCE, "resolve.entries");
                for id in ids {
                    if !seen.insert(id) {
                        continue;
                    }
                    match entries.get(id) {
                        Some(entry) if entry.is_fresh(now, self.state.ttl) => {
                            resolved.found.insert(id.clone(), entry.record.clone());
                            continue;
                        }
                        Some(_) => {
                            entries.pop(id);
                            counter!(METRIC_EVICT, "reason" => "expired").increment(1);
                        }
                        None => {}
                    }

                    match in_flight.get(id) {
                        Some(flight) => waits.push((id.clone(), flight.clone())),
                        None => cold.push(id.clone()),
                    }
                }
            }

            counter!(METRIC_HIT).increment(resolved.found.len() as u64);
            counter!(METRIC_MISS).increment((waits.len() + cold.len()) as u64);

            if !cold.is_empty() {
                let flight = spawn_shared(fetch_batch(
                    self.provider.clone(),
                    self.state.clone(),
                    cold.clone(),
                ));
                for id in cold {
                    in_flight.insert(id.clone(), flight.clone());
                    waits.push((id, flight.clone()));
                }
            }
        }

        if waits.is_empty() {
            return resolved;
        }

        let outcomes = join_all(waits.iter().map(|(_, flight)| flight.clone())).await;
        for ((id, _), outcome) in waits.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(records)) => match records.get(&id) {
                    Some(record) => {
                        resolved.found.insert(id, record.clone());
                    }
                    None => {
                        resolved.unresolved.insert(id);
                    }
                },
                Ok(Err(_)) => {
                    resolved.unresolved.insert(id);
                }
                Err(err) => {
                    debug!(target = SOURCE, user_id = %id, error = %err, "author fetch aborted");
                    resolved.unresolved.insert(id);
                }
            }
        }

        resolved
    }

    /// Resolve one author. `None` means not found or upstream unavailable.
    pub async fn resolve_one(&self, id: &UserId) -> Option<IdentityRecord> {
        self.resolve(std::slice::from_ref(id))
            .await
            .found
            .remove(id)
    }

    /// Seed a record fetched through another path.
    pub fn prime(&self, record: &IdentityRecord) {
        let mut records = HashMap::with_capacity(1);
        records.insert(record.id.clone(), record.clone());
        self.state.store(std::slice::from_ref(&record.id), &records);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.state.entries, SOURCE, "sweep.entries");
        let expired: Vec<UserId> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now, self.state.ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            entries.pop(id);
        }
        if !expired.is_empty() {
            counter!(METRIC_EVICT, "reason" => "sweep").increment(expired.len() as u64);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn fetch_batch(
    provider: Arc<dyn IdentityProvider>,
    state: Arc<AuthorState>,
    ids: Vec<UserId>,
) -> BatchOutcome {
    counter!(METRIC_UPSTREAM_BATCH).increment(1);
    let result = provider.get_by_ids(&ids).await;

    let mut in_flight = mutex_lock(&state.in_flight, SOURCE, "fetch.in_flight");
    match &result {
        Ok(records) => {
            state.store(&ids, records);
            let missing = ids.iter().filter(|id| !records.contains_key(*id)).count();
            debug!(
                target = SOURCE,
                requested = ids.len(),
                missing,
                "author batch resolved"
            );
        }
        Err(err) => warn!(
            target = SOURCE,
            requested = ids.len(),
            error = %err,
            "author batch lookup failed; posts fall back to placeholders"
        ),
    }
    for id in &ids {
        in_flight.remove(id);
    }

    result.map(Arc::new)
}
