#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::Response;
use time::OffsetDateTime;
use uuid::Uuid;

use chirp::application::access::{AccessGate, RequestDescriptor, RouteTable, SessionVerifier};
use chirp::application::feed::{FeedLimits, FeedService};
use chirp::application::identity::{IdentityError, IdentityProvider};
use chirp::application::posts::PostService;
use chirp::application::profile::{ProfileService, ProfileSettings};
use chirp::application::rate_limit::PostRateLimiter;
use chirp::application::repos::{CreatePostParams, PostsRepo, PostsWriteRepo, RepoError};
use chirp::cache::{AuthorCache, CacheConfig, CacheConsumer, CacheTrigger, EventQueue, FeedViewStore};
use chirp::domain::entities::{IdentityRecord, PostRecord, UserId};
use chirp::infra::http::{HttpState, build_router};

pub const ALICE_TOKEN: &str = "sess_alice";

#[derive(Default)]
pub struct Directory {
    users: Mutex<HashMap<UserId, IdentityRecord>>,
    pub batch_calls: AtomicUsize,
    pub username_calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl Directory {
    pub fn with_users(names: &[&str]) -> Self {
        let users = names
            .iter()
            .map(|name| {
                let record = IdentityRecord {
                    id: UserId::from(format!("user_{name}")),
                    username: (*name).to_string(),
                    avatar_url: Some(format!("https://img.example.com/{name}.png")),
                };
                (record.id.clone(), record)
            })
            .collect();
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for Directory {
    async fn get_by_id(&self, id: &UserId) -> Result<Option<IdentityRecord>, IdentityError> {
        self.check()?;
        Ok(self.users.lock().expect("users").get(id).cloned())
    }

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<IdentityRecord>, IdentityError> {
        self.username_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .users
            .lock()
            .expect("users")
            .values()
            .find(|record| record.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn get_by_ids(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, IdentityRecord>, IdentityError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let users = self.users.lock().expect("users");
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(|record| (id.clone(), record.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct PostsStore {
    posts: Mutex<Vec<PostRecord>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub offline: AtomicBool,
}

impl PostsStore {
    pub fn seed(&self, author: &str, content: &str, seconds: i64) -> PostRecord {
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id: UserId::from(format!("user_{author}")),
            content: content.to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH + Duration::from_secs(seconds as u64),
        };
        self.posts.lock().expect("posts").push(post.clone());
        post
    }

    pub fn len(&self) -> usize {
        self.posts.lock().expect("posts").len()
    }
}

#[async_trait]
impl PostsRepo for PostsStore {
    async fn list_recent_posts(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut posts = self.posts.lock().expect("posts").clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .posts
            .lock()
            .expect("posts")
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostsWriteRepo for PostsStore {
    async fn insert_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id: params.author_id,
            content: params.content,
            created_at: OffsetDateTime::now_utc(),
        };
        self.posts.lock().expect("posts").push(post.clone());
        Ok(post)
    }
}

pub struct Sessions {
    tokens: HashMap<String, UserId>,
    pub calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl Sessions {
    pub fn new(tokens: &[(&str, &str)]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, user)| ((*token).to_string(), UserId::from(*user)))
                .collect(),
            calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionVerifier for Sessions {
    async fn current_user_id(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<UserId>, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("session service offline".to_string()));
        }
        Ok(request
            .session_token
            .as_deref()
            .and_then(|token| self.tokens.get(token))
            .cloned())
    }
}

pub struct TestApp {
    pub router: Router,
    pub posts: Arc<PostsStore>,
    pub directory: Arc<Directory>,
    pub sessions: Arc<Sessions>,
}

pub fn app(users: &[&str], max_posts: u32) -> TestApp {
    let config = CacheConfig::default();
    let posts = Arc::new(PostsStore::default());
    let directory = Arc::new(Directory::with_users(users));
    let sessions = Arc::new(Sessions::new(&[(ALICE_TOKEN, "user_alice")]));

    let authors = Arc::new(AuthorCache::new(directory.clone(), &config));
    let views = Arc::new(FeedViewStore::new(&config));
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(config, queue.clone(), views.clone()));
    let trigger = Arc::new(CacheTrigger::new(queue, consumer));

    let feed = FeedService::new(posts.clone(), authors.clone(), FeedLimits::default())
        .with_view_cache(views);
    let writer = PostService::new(
        posts.clone(),
        PostRateLimiter::new(Duration::from_secs(60), max_posts),
        280,
    )
    .with_cache_trigger(trigger);
    let profiles = ProfileService::new(
        directory.clone(),
        Some(authors),
        ProfileSettings {
            revalidate_after: Duration::from_secs(60),
            max_snapshots: NonZeroUsize::new(16).expect("non-zero"),
        },
    );

    let state = HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(writer),
        profiles: Arc::new(profiles),
        health: posts.clone(),
    };
    let gate = Arc::new(AccessGate::new(RouteTable::default(), sessions.clone()));

    TestApp {
        router: build_router(state, gate),
        posts,
        directory,
        sessions,
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
