//! Post creation.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::application::rate_limit::{PostRateLimiter, RateDecision};
use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError};
use crate::cache::CacheTrigger;
use crate::domain::entities::{PostRecord, UserId};
use crate::domain::error::ValidationError;
use crate::domain::posts::validate_content;

const METRIC_RATE_LIMITED: &str = "chirp_post_rate_limited_total";

#[derive(Debug, Error)]
pub enum CreatePostError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("rate limit exceeded; retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PostService {
    writer: Arc<dyn PostsWriteRepo>,
    limiter: PostRateLimiter,
    max_content_chars: usize,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

impl PostService {
    pub fn new(
        writer: Arc<dyn PostsWriteRepo>,
        limiter: PostRateLimiter,
        max_content_chars: usize,
    ) -> Self {
        Self {
            writer,
            limiter,
            max_content_chars,
            cache_trigger: None,
        }
    }

    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    /// Validate, rate limit, persist, then mark feed views stale.
    ///
    /// Validation runs first so malformed submissions never consume quota.
    #[instrument(skip(self, content), fields(author_id = %author_id))]
    pub async fn create_post(
        &self,
        author_id: &UserId,
        content: String,
    ) -> Result<PostRecord, CreatePostError> {
        validate_content(&content, self.max_content_chars)?;

        if let RateDecision::Limited { retry_after } = self.limiter.check(author_id) {
            counter!(METRIC_RATE_LIMITED).increment(1);
            info!(
                retry_after_ms = retry_after.as_millis() as u64,
                "post rejected by rate limit"
            );
            return Err(CreatePostError::RateLimited { retry_after });
        }

        let post = self
            .writer
            .insert_post(CreatePostParams {
                author_id: author_id.clone(),
                content,
            })
            .await
            .map_err(|err| {
                error!(error = %err, "failed to persist post");
                CreatePostError::Repo(err)
            })?;

        if let Some(trigger) = &self.cache_trigger {
            trigger.post_created(post.id, &post.author_id);
        }

        info!(post_id = %post.id, "post created");
        Ok(post)
    }
}
