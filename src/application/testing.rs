//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::access::{RequestDescriptor, SessionVerifier};
use crate::application::identity::{IdentityError, IdentityProvider};
use crate::application::repos::{CreatePostParams, PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::entities::{IdentityRecord, PostRecord, UserId};

pub(crate) fn identity(id: &str) -> IdentityRecord {
    IdentityRecord {
        id: UserId::from(id),
        username: id.to_string(),
        avatar_url: Some(format!("https://img.example.com/{id}.png")),
    }
}

#[derive(Default)]
pub(crate) struct FakeIdentity {
    users: Mutex<HashMap<UserId, IdentityRecord>>,
    batch_log: Mutex<Vec<Vec<UserId>>>,
    failing: Mutex<HashSet<UserId>>,
    pub batch_calls: AtomicUsize,
    pub username_calls: AtomicUsize,
    unavailable: AtomicBool,
    delay: Option<Duration>,
}

impl FakeIdentity {
    pub fn with_users(ids: &[&str]) -> Self {
        let users = ids
            .iter()
            .map(|id| (UserId::from(*id), identity(id)))
            .collect();
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Ids that are silently dropped from batch responses.
    pub fn fail_ids(&self, ids: &[&str]) {
        let mut failing = self.failing.lock().expect("failing lock");
        failing.extend(ids.iter().map(|id| UserId::from(*id)));
    }

    pub fn remove_user(&self, id: &str) {
        self.users.lock().expect("users lock").remove(&UserId::from(id));
    }

    pub fn batches(&self) -> Vec<Vec<UserId>> {
        self.batch_log.lock().expect("batch log lock").clone()
    }

    async fn pause(&self) -> Result<(), IdentityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("fake outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_by_id(&self, id: &UserId) -> Result<Option<IdentityRecord>, IdentityError> {
        self.pause().await?;
        Ok(self.users.lock().expect("users lock").get(id).cloned())
    }

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<IdentityRecord>, IdentityError> {
        self.username_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        let users = self.users.lock().expect("users lock");
        Ok(users
            .values()
            .find(|record| record.username == username)
            .cloned())
    }

    async fn get_by_ids(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, IdentityRecord>, IdentityError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_log
            .lock()
            .expect("batch log lock")
            .push(ids.to_vec());
        self.pause().await?;
        let users = self.users.lock().expect("users lock");
        let failing = self.failing.lock().expect("failing lock");
        Ok(ids
            .iter()
            .filter(|id| !failing.contains(*id))
            .filter_map(|id| users.get(id).map(|record| (id.clone(), record.clone())))
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MemoryPosts {
    posts: Mutex<Vec<PostRecord>>,
    pub list_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl MemoryPosts {
    pub fn seed(&self, author: &str, content: &str, created_at: OffsetDateTime) -> PostRecord {
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id: UserId::from(author),
            content: content.to_string(),
            created_at,
        };
        self.posts.lock().expect("posts lock").push(post.clone());
        post
    }

    pub fn push(&self, post: PostRecord) {
        self.posts.lock().expect("posts lock").push(post);
    }

    pub fn len(&self) -> usize {
        self.posts.lock().expect("posts lock").len()
    }
}

#[async_trait]
impl PostsRepo for MemoryPosts {
    async fn list_recent_posts(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut posts = self.posts.lock().expect("posts lock").clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let posts = self.posts.lock().expect("posts lock");
        Ok(posts.iter().find(|post| post.id == id).cloned())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryPosts {
    async fn insert_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("fake storage outage".to_string()));
        }
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id: params.author_id,
            content: params.content,
            created_at: OffsetDateTime::now_utc(),
        };
        self.push(post.clone());
        Ok(post)
    }
}

#[derive(Default)]
pub(crate) struct StaticSessions {
    tokens: HashMap<String, UserId>,
    pub calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl StaticSessions {
    pub fn new(tokens: &[(&str, &str)]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, user)| ((*token).to_string(), UserId::from(*user)))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SessionVerifier for StaticSessions {
    async fn current_user_id(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<UserId>, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("fake outage".to_string()));
        }
        Ok(request
            .session_token
            .as_deref()
            .and_then(|token| self.tokens.get(token))
            .cloned())
    }
}
