//! Timeline cache
//!
//! One logical timeline keyed by user id. A row is either a follower's
//! precomputed feed (filled by fan-out on write) or a celebrity's own
//! posts (read by every follower at query time). Both share the same
//! contract:
//! - `append` upserts by post id, so duplicate delivery is harmless
//! - `range` returns items newest first inside a `RangeWindow`
//!
//! Backends:
//! - `RedisTimelineCache`: one sorted set per row, score = `created_at`
//! - `InMemoryTimelineCache`: process-local rows for development and tests

mod memory;
mod redis_store;

pub use self::memory::InMemoryTimelineCache;
pub use self::redis_store::{RedisTimelineCache, TimelineCacheConfig};
pub use crate::cursor::Boundary;

use crate::error::Result;
use crate::models::{FeedItem, TimelineEntry};
use async_trait::async_trait;

/// Time window of a range query.
///
/// `before` comes from the pagination cursor and bounds from above
/// (exclusive). `floor` is the chained lower bound threaded between
/// consecutive row reads (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub before: Boundary,
    pub floor: Option<i64>,
}

impl RangeWindow {
    pub fn new(before: Boundary) -> Self {
        Self {
            before,
            floor: None,
        }
    }

    pub fn with_floor(mut self, floor: Option<i64>) -> Self {
        self.floor = floor;
        self
    }

    pub fn admits(&self, created_at: i64) -> bool {
        self.before.admits(created_at) && self.floor.map_or(true, |floor| created_at >= floor)
    }
}

/// Where a range read stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBoundary {
    /// `limit` items were returned; the row may hold older ones below this timestamp
    Oldest(i64),
    /// Fewer than `limit` items were returned; nothing older inside the window
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePage {
    /// Newest first
    pub items: Vec<TimelineEntry>,
    pub next: RangeBoundary,
}

impl RangePage {
    pub fn from_items(items: Vec<TimelineEntry>, limit: usize) -> Self {
        let next = match items.last() {
            Some(oldest) if items.len() >= limit => RangeBoundary::Oldest(oldest.created_at),
            _ => RangeBoundary::Exhausted,
        };
        Self { items, next }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: RangeBoundary::Exhausted,
        }
    }
}

#[async_trait]
pub trait TimelineCache: Send + Sync {
    /// Idempotently insert `item` into the row owned by `owner_user_id`.
    async fn append(&self, owner_user_id: &str, item: &FeedItem) -> Result<()>;

    /// Up to `limit` items of the row inside `window`, newest first.
    async fn range(&self, owner_user_id: &str, window: RangeWindow, limit: usize)
        -> Result<RangePage>;

    /// Release backing connections. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}
