//! Redis-backed timeline rows
//!
//! Key pattern: `{prefix}:{user_id}` → sorted set of post ids scored by
//! `created_at`. ZADD on an existing member only rewrites its score, which
//! is what makes redelivered fan-out writes idempotent.

use super::{RangePage, RangeWindow, TimelineCache};
use crate::cursor::Boundary;
use crate::error::{AppError, Result};
use crate::models::{FeedItem, TimelineEntry};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TimelineCacheConfig {
    pub key_prefix: String,
    /// Newest items kept per row; 0 disables trimming
    pub max_row_size: usize,
}

impl Default for TimelineCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "timeline".to_string(),
            max_row_size: 800,
        }
    }
}

pub struct RedisTimelineCache {
    client: RwLock<Option<ConnectionManager>>,
    config: TimelineCacheConfig,
}

impl RedisTimelineCache {
    pub async fn new(redis_url: &str, config: TimelineCacheConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Failed to create Redis client: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to create Redis connection: {}", e)))?;

        Ok(Self {
            client: RwLock::new(Some(manager)),
            config,
        })
    }

    fn row_key(&self, user_id: &str) -> String {
        row_key(&self.config.key_prefix, user_id)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.client.read().await.clone().ok_or(AppError::CacheClosed)
    }

    /// Ping Redis to check connection health
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                AppError::Redis(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl TimelineCache for RedisTimelineCache {
    async fn append(&self, owner_user_id: &str, item: &FeedItem) -> Result<()> {
        let key = self.row_key(owner_user_id);
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(item.created_at)
            .arg(&item.post_id)
            .ignore();

        if self.config.max_row_size > 0 {
            // Keep ranks [-max_row_size, -1], i.e. the newest items
            pipe.cmd("ZREMRANGEBYRANK")
                .arg(&key)
                .arg(0)
                .arg(-(self.config.max_row_size as i64) - 1)
                .ignore();
        }

        pipe.query_async::<_, ()>(&mut conn).await.map_err(|e| {
            warn!(post_id = %item.post_id, user_id = %owner_user_id, "Redis ZADD failed: {}", e);
            AppError::Redis(e)
        })?;

        Ok(())
    }

    async fn range(
        &self,
        owner_user_id: &str,
        window: RangeWindow,
        limit: usize,
    ) -> Result<RangePage> {
        if limit == 0 {
            return Ok(RangePage::empty());
        }

        let key = self.row_key(owner_user_id);
        let (max, min) = score_bounds(&window);
        let mut conn = self.connection().await?;

        let rows: Vec<(String, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(&key)
            .arg(&max)
            .arg(&min)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis ZREVRANGEBYSCORE failed for {}: {}", key, e);
                AppError::Redis(e)
            })?;

        let items: Vec<TimelineEntry> = rows
            .into_iter()
            .map(|(post_id, score)| TimelineEntry {
                post_id,
                created_at: score as i64,
            })
            .collect();

        debug!(
            user_id = %owner_user_id,
            max = %max,
            min = %min,
            returned = items.len(),
            "Timeline range read"
        );

        Ok(RangePage::from_items(items, limit))
    }

    async fn close(&self) -> Result<()> {
        if self.client.write().await.take().is_some() {
            debug!("Timeline cache connection released");
        }
        Ok(())
    }
}

fn row_key(prefix: &str, user_id: &str) -> String {
    format!("{}:{}", prefix, user_id)
}

/// ZREVRANGEBYSCORE bounds: exclusive cursor on top, inclusive floor below.
fn score_bounds(window: &RangeWindow) -> (String, String) {
    let max = match window.before {
        Boundary::Newest => "+inf".to_string(),
        Boundary::Before(ts) => format!("({}", ts),
    };
    let min = match window.floor {
        Some(floor) => floor.to_string(),
        None => "-inf".to_string(),
    };
    (max, min)
}
