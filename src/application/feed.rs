//! Feed assembly.
//!
//! Loads recent posts, resolves their distinct authors through one cache
//! call, and joins the two. Identity failures never fail the feed; the
//! affected posts carry the placeholder author instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::repos::{PostsRepo, RepoError};
use crate::cache::{AuthorCache, FeedViewStore, ResolvedAuthors};
use crate::domain::entities::{EnrichedPost, PostRecord, UserId};

const METRIC_FEED_ASSEMBLY_MS: &str = "chirp_feed_assembly_ms";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("post `{0}` not found")]
    NotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl FeedLimits {
    /// Effective page size: the default when absent, clamped to `1..=max`.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 100,
        }
    }
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    authors: Arc<AuthorCache>,
    views: Option<Arc<FeedViewStore>>,
    limits: FeedLimits,
}

impl FeedService {
    pub fn new(posts: Arc<dyn PostsRepo>, authors: Arc<AuthorCache>, limits: FeedLimits) -> Self {
        Self {
            posts,
            authors,
            views: None,
            limits,
        }
    }

    pub fn with_view_cache(mut self, views: Arc<FeedViewStore>) -> Self {
        self.views = Some(views);
        self
    }

    #[instrument(skip(self))]
    pub async fn get_feed(&self, limit: Option<u32>) -> Result<Arc<Vec<EnrichedPost>>, FeedError> {
        let limit = self.limits.clamp(limit);

        if let Some(views) = &self.views
            && let Some(cached) = views.get(limit)
        {
            debug!(limit, posts = cached.len(), "feed served from view cache");
            return Ok(cached);
        }

        let started_at = Instant::now();
        let generation = self.views.as_ref().map(|views| views.generation());

        let mut posts = self.posts.list_recent_posts(limit).await?;
        order_newest_first(&mut posts);
        posts.truncate(limit as usize);

        let author_ids = distinct_authors(&posts);
        let resolved = self.authors.resolve(&author_ids).await;
        let complete = resolved.unresolved.is_empty();
        let feed = Arc::new(join_authors(posts, &resolved));

        if let (Some(views), Some(generation)) = (&self.views, generation)
            && complete
        {
            views.put(limit, generation, feed.clone());
        }

        histogram!(METRIC_FEED_ASSEMBLY_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            limit,
            posts = feed.len(),
            authors = author_ids.len(),
            unresolved = resolved.unresolved.len(),
            "feed assembled"
        );

        Ok(feed)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<EnrichedPost, FeedError> {
        let post = self
            .posts
            .find_post(id)
            .await?
            .ok_or(FeedError::NotFound(id))?;

        Ok(match self.authors.resolve_one(&post.author_id).await {
            Some(author) => EnrichedPost::resolved(post, author),
            None => EnrichedPost::placeholder(post),
        })
    }
}

/// Newest first; equal timestamps fall back to descending id.
pub fn order_newest_first(posts: &mut [PostRecord]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Distinct author ids in first-seen order.
pub fn distinct_authors(posts: &[PostRecord]) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts
        .iter()
        .filter(|post| seen.insert(&post.author_id))
        .map(|post| post.author_id.clone())
        .collect()
}

fn join_authors(posts: Vec<PostRecord>, resolved: &ResolvedAuthors) -> Vec<EnrichedPost> {
    posts
        .into_iter()
        .map(|post| match resolved.found.get(&post.author_id) {
            Some(author) => EnrichedPost::resolved(post, author.clone()),
            None => EnrichedPost::placeholder(post),
        })
        .collect()
}
