//! Domain entities mirrored from storage and the identity provider.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Username shown for posts whose author could not be resolved.
pub const PLACEHOLDER_USERNAME: &str = "unknown";

/// Opaque identity-provider user id (e.g. `user_2abc...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: UserId,
    pub content: String,
    pub created_at: OffsetDateTime,
}

/// Client-safe projection of a provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl IdentityRecord {
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            username: PLACEHOLDER_USERNAME.to_string(),
            avatar_url: None,
        }
    }
}

/// A post joined with its author. Produced on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedPost {
    pub post: PostRecord,
    pub author: IdentityRecord,
    pub author_resolved: bool,
}

impl EnrichedPost {
    pub fn resolved(post: PostRecord, author: IdentityRecord) -> Self {
        Self {
            post,
            author,
            author_resolved: true,
        }
    }

    pub fn placeholder(post: PostRecord) -> Self {
        let author = IdentityRecord::placeholder(post.author_id.clone());
        Self {
            post,
            author,
            author_resolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_keeps_author_id() {
        let post = PostRecord {
            id: Uuid::nil(),
            author_id: UserId::from("user_1"),
            content: "hi".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let enriched = EnrichedPost::placeholder(post);

        assert!(!enriched.author_resolved);
        assert_eq!(enriched.author.id.as_str(), "user_1");
        assert_eq!(enriched.author.username, PLACEHOLDER_USERNAME);
        assert!(enriched.author.avatar_url.is_none());
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let value = serde_json::to_value(UserId::from("user_9")).expect("serialize");
        assert_eq!(value, serde_json::json!("user_9"));
    }
}
