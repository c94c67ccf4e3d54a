use serde::{Deserialize, Serialize};

/// Payload of a post-creation event as emitted by the post service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreatedEvent {
    pub post_id: String,
    /// Author of the post
    pub user_id: String,
    pub created_at: i64,
}

/// One post's appearance in a timeline row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedItem {
    pub post_id: String,
    pub author_id: String,
    /// Ranking key
    pub created_at: i64,
}

impl From<PostCreatedEvent> for FeedItem {
    fn from(event: PostCreatedEvent) -> Self {
        Self {
            post_id: event.post_id,
            author_id: event.user_id,
            created_at: event.created_at,
        }
    }
}

/// A timeline row member as read back from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimelineEntry {
    pub post_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub user_id: String,
    pub cursor: String,
    pub page_size: i32,
}

impl PageRequest {
    pub fn new(user_id: impl Into<String>, cursor: impl Into<String>, page_size: i32) -> Self {
        Self {
            user_id: user_id.into(),
            cursor: cursor.into(),
            page_size,
        }
    }
}

/// Post body as returned by the post-content service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

/// Fully hydrated post ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedPost {
    pub post_id: String,
    pub author_id: String,
    /// None when the profile service could not resolve the author
    pub author_display_name: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

impl From<PostRecord> for HydratedPost {
    fn from(record: PostRecord) -> Self {
        Self {
            post_id: record.post_id,
            author_id: record.author_id,
            author_display_name: None,
            content: record.content,
            created_at: record.created_at,
            like_count: record.like_count,
            comment_count: record.comment_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Newest first
    pub posts: Vec<HydratedPost>,
    /// None means this is the last page
    pub next_cursor: Option<String>,
}
