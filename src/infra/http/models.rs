use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::domain::entities::{EnrichedPost, IdentityRecord, PostRecord};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
}

impl From<&PostRecord> for PostView {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            author_id: post.author_id.to_string(),
            content: post.content.clone(),
            created_at: post
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| post.created_at.unix_timestamp().to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorView {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl From<&IdentityRecord> for AuthorView {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.id.to_string(),
            username: record.username.clone(),
            avatar_url: record.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrichedPostView {
    pub post: PostView,
    pub author: AuthorView,
}

impl From<&EnrichedPost> for EnrichedPostView {
    fn from(enriched: &EnrichedPost) -> Self {
        Self {
            post: PostView::from(&enriched.post),
            author: AuthorView::from(&enriched.author),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub posts: Vec<EnrichedPostView>,
}

impl FeedResponse {
    pub fn from_posts(posts: &[EnrichedPost]) -> Self {
        Self {
            posts: posts.iter().map(EnrichedPostView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::UserId;

    #[test]
    fn placeholder_author_serializes_with_null_avatar() {
        let post = PostRecord {
            id: Uuid::nil(),
            author_id: UserId::from("user_1"),
            content: "hello".to_string(),
            created_at: datetime!(2024-05-01 12:00 UTC),
        };
        let view = EnrichedPostView::from(&EnrichedPost::placeholder(post));

        let json = serde_json::to_value(&view).expect("serialize");

        assert_eq!(json["post"]["created_at"], "2024-05-01T12:00:00Z");
        assert_eq!(json["author"]["username"], "unknown");
        assert!(json["author"]["avatar_url"].is_null());
    }
}
