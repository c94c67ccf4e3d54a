//! Shared fakes for integration tests
//!
//! None of these touch the network: the social graph, post and profile
//! services are in-process maps and the timeline cache wraps the
//! in-memory backend with call counters and injectable failures.

#![allow(dead_code)]

use async_trait::async_trait;
use feed_service::cache::{RangePage, RangeWindow};
use feed_service::config::FanoutConfig;
use feed_service::error::{AppError, Result};
use feed_service::grpc::clients::{PostContent, SocialGraph, UserProfiles};
use feed_service::models::{FeedItem, PostRecord};
use feed_service::{InMemoryTimelineCache, TimelineCache};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn unavailable(service: &'static str) -> AppError {
    AppError::Downstream {
        service,
        message: "Unavailable: connection refused".to_string(),
    }
}

pub fn item(post_id: &str, author_id: &str, created_at: i64) -> FeedItem {
    FeedItem {
        post_id: post_id.to_string(),
        author_id: author_id.to_string(),
        created_at,
    }
}

pub fn event_json(post_id: &str, user_id: &str, created_at: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "post_id": post_id,
        "user_id": user_id,
        "created_at": created_at,
    }))
    .unwrap()
}

pub fn fanout_config(worker_threshold: usize) -> FanoutConfig {
    FanoutConfig {
        worker_threshold,
        poll_timeout: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(2),
    }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================
// Social graph
// ============================================

#[derive(Default)]
pub struct FakeGraph {
    celebrities: HashSet<String>,
    followers: HashMap<String, Vec<String>>,
    followed_celebrities: HashMap<String, Vec<String>>,
    fail_is_celebrity: bool,
    fail_followers: bool,
    fail_followed_celebrities: bool,
    pub is_celebrity_calls: AtomicUsize,
    pub followers_calls: AtomicUsize,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as a celebrity. Call before `follow`.
    pub fn celebrity(mut self, user_id: &str) -> Self {
        self.celebrities.insert(user_id.to_string());
        self
    }

    pub fn follow(mut self, follower_id: &str, author_id: &str) -> Self {
        self.followers
            .entry(author_id.to_string())
            .or_default()
            .push(follower_id.to_string());
        if self.celebrities.contains(author_id) {
            self.followed_celebrities
                .entry(follower_id.to_string())
                .or_default()
                .push(author_id.to_string());
        }
        self
    }

    pub fn failing_is_celebrity(mut self) -> Self {
        self.fail_is_celebrity = true;
        self
    }

    pub fn failing_followers(mut self) -> Self {
        self.fail_followers = true;
        self
    }

    pub fn failing_followed_celebrities(mut self) -> Self {
        self.fail_followed_celebrities = true;
        self
    }
}

#[async_trait]
impl SocialGraph for FakeGraph {
    async fn is_celebrity(&self, user_id: &str) -> Result<bool> {
        self.is_celebrity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_is_celebrity {
            return Err(AppError::Timeout {
                operation: "IsCelebrity",
                after: Duration::from_secs(5),
            });
        }
        Ok(self.celebrities.contains(user_id))
    }

    async fn get_followers(&self, user_id: &str) -> Result<Vec<String>> {
        self.followers_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_followers {
            return Err(unavailable("graph-service"));
        }
        Ok(self.followers.get(user_id).cloned().unwrap_or_default())
    }

    async fn get_followed_celebrities(&self, user_id: &str) -> Result<Vec<String>> {
        if self.fail_followed_celebrities {
            return Err(unavailable("graph-service"));
        }
        Ok(self
            .followed_celebrities
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================
// Post content
// ============================================

#[derive(Default)]
pub struct FakePosts {
    records: HashMap<String, PostRecord>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakePosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post(mut self, post_id: &str, author_id: &str, created_at: i64) -> Self {
        self.records.insert(
            post_id.to_string(),
            PostRecord {
                post_id: post_id.to_string(),
                author_id: author_id.to_string(),
                content: format!("content of {}", post_id),
                created_at,
                like_count: 1,
                comment_count: 0,
            },
        );
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl PostContent for FakePosts {
    async fn get_posts(&self, post_ids: &[String]) -> Result<Vec<PostRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable("post-service"));
        }
        // Reverse order on purpose: callers must not depend on response order
        Ok(post_ids
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }
}

// ============================================
// User profiles
// ============================================

#[derive(Default)]
pub struct FakeProfiles {
    names: HashMap<String, String>,
    fail: bool,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, user_id: &str, display_name: &str) -> Self {
        self.names
            .insert(user_id.to_string(), display_name.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl UserProfiles for FakeProfiles {
    async fn get_display_names(&self, user_ids: &[String]) -> Result<HashMap<String, String>> {
        if self.fail {
            return Err(unavailable("user-service"));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| self.names.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}

// ============================================
// Timeline cache
// ============================================

/// In-memory timeline cache that counts calls and can fail chosen rows.
#[derive(Default)]
pub struct CountingCache {
    inner: InMemoryTimelineCache,
    failing_rows: HashSet<String>,
    append_delay: Option<Duration>,
    appends: AtomicUsize,
    appended_by_row: Mutex<HashMap<String, usize>>,
    ranges: Mutex<Vec<(String, RangeWindow)>>,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_row(mut self, owner_user_id: &str) -> Self {
        self.failing_rows.insert(owner_user_id.to_string());
        self
    }

    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// Successful appends to one row, duplicates included
    pub fn appended_to(&self, owner_user_id: &str) -> usize {
        self.appended_by_row
            .lock()
            .unwrap()
            .get(owner_user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every range call so far, in order
    pub fn ranges(&self) -> Vec<(String, RangeWindow)> {
        self.ranges.lock().unwrap().clone()
    }

    pub async fn row_len(&self, owner_user_id: &str) -> usize {
        self.inner.row_len(owner_user_id).await
    }

    /// Seed a row directly, bypassing counters.
    pub async fn seed(&self, owner_user_id: &str, items: &[FeedItem]) {
        for item in items {
            self.inner.append(owner_user_id, item).await.unwrap();
        }
    }

    fn check_row(&self, owner_user_id: &str) -> Result<()> {
        if self.failing_rows.contains(owner_user_id) {
            return Err(AppError::Cache(format!("row {} unavailable", owner_user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl TimelineCache for CountingCache {
    async fn append(&self, owner_user_id: &str, item: &FeedItem) -> Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_row(owner_user_id)?;
        self.inner.append(owner_user_id, item).await?;
        *self
            .appended_by_row
            .lock()
            .unwrap()
            .entry(owner_user_id.to_string())
            .or_default() += 1;
        Ok(())
    }

    async fn range(
        &self,
        owner_user_id: &str,
        window: RangeWindow,
        limit: usize,
    ) -> Result<RangePage> {
        self.ranges
            .lock()
            .unwrap()
            .push((owner_user_id.to_string(), window));
        self.check_row(owner_user_id)?;
        self.inner.range(owner_user_id, window, limit).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
