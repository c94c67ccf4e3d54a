use super::{RangePage, RangeWindow, TimelineCache};
use crate::error::{AppError, Result};
use crate::models::{FeedItem, TimelineEntry};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Row {
    scores: HashMap<String, i64>,
    /// (created_at, post_id) ascending; iterate in reverse for newest first
    ordered: BTreeSet<(i64, String)>,
}

impl Row {
    fn upsert(&mut self, post_id: &str, created_at: i64) {
        if let Some(previous) = self.scores.insert(post_id.to_string(), created_at) {
            self.ordered.remove(&(previous, post_id.to_string()));
        }
        self.ordered.insert((created_at, post_id.to_string()));
    }
}

/// Process-local timeline rows with the same ordering and upsert
/// semantics as the Redis backend.
#[derive(Default)]
pub struct InMemoryTimelineCache {
    rows: RwLock<HashMap<String, Row>>,
    closed: AtomicBool,
}

impl InMemoryTimelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::CacheClosed);
        }
        Ok(())
    }

    /// Number of items currently in a row
    pub async fn row_len(&self, owner_user_id: &str) -> usize {
        self.rows
            .read()
            .await
            .get(owner_user_id)
            .map_or(0, |row| row.scores.len())
    }
}

#[async_trait]
impl TimelineCache for InMemoryTimelineCache {
    async fn append(&self, owner_user_id: &str, item: &FeedItem) -> Result<()> {
        self.ensure_open()?;
        self.rows
            .write()
            .await
            .entry(owner_user_id.to_string())
            .or_default()
            .upsert(&item.post_id, item.created_at);
        Ok(())
    }

    async fn range(
        &self,
        owner_user_id: &str,
        window: RangeWindow,
        limit: usize,
    ) -> Result<RangePage> {
        self.ensure_open()?;
        if limit == 0 {
            return Ok(RangePage::empty());
        }

        let rows = self.rows.read().await;
        let items: Vec<TimelineEntry> = match rows.get(owner_user_id) {
            Some(row) => row
                .ordered
                .iter()
                .rev()
                .filter(|(created_at, _)| window.admits(*created_at))
                .take(limit)
                .map(|(created_at, post_id)| TimelineEntry {
                    post_id: post_id.clone(),
                    created_at: *created_at,
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(RangePage::from_items(items, limit))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Boundary, RangeBoundary};

    fn item(post_id: &str, created_at: i64) -> FeedItem {
        FeedItem {
            post_id: post_id.to_string(),
            author_id: "author".to_string(),
            created_at,
        }
    }

    fn post_ids(page: &RangePage) -> Vec<&str> {
        page.items.iter().map(|e| e.post_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let cache = InMemoryTimelineCache::new();
        let post = item("p1", 100);

        cache.append("u1", &post).await.unwrap();
        cache.append("u1", &post).await.unwrap();

        let page = cache
            .range("u1", RangeWindow::new(Boundary::Newest), 10)
            .await
            .unwrap();
        assert_eq!(post_ids(&page), vec!["p1"]);
        assert_eq!(cache.row_len("u1").await, 1);
    }

    #[tokio::test]
    async fn test_reappend_moves_score() {
        let cache = InMemoryTimelineCache::new();
        cache.append("u1", &item("p1", 100)).await.unwrap();
        cache.append("u1", &item("p1", 300)).await.unwrap();
        cache.append("u1", &item("p2", 200)).await.unwrap();

        let page = cache
            .range("u1", RangeWindow::new(Boundary::Newest), 10)
            .await
            .unwrap();
        assert_eq!(post_ids(&page), vec!["p1", "p2"]);
        assert_eq!(page.items[0].created_at, 300);
    }

    #[tokio::test]
    async fn test_range_orders_newest_first_and_respects_boundary() {
        let cache = InMemoryTimelineCache::new();
        for (id, ts) in [("t2", 200), ("t3", 100), ("t1", 300)] {
            cache.append("u1", &item(id, ts)).await.unwrap();
        }

        let all = cache
            .range("u1", RangeWindow::new(Boundary::Newest), 10)
            .await
            .unwrap();
        assert_eq!(post_ids(&all), vec!["t1", "t2", "t3"]);
        assert_eq!(all.next, RangeBoundary::Exhausted);

        let below = cache
            .range("u1", RangeWindow::new(Boundary::Before(300)), 10)
            .await
            .unwrap();
        assert_eq!(post_ids(&below), vec!["t2", "t3"]);
        assert!(below.items.iter().all(|e| e.created_at < 300));
    }

    #[tokio::test]
    async fn test_range_limit_reports_oldest() {
        let cache = InMemoryTimelineCache::new();
        for (id, ts) in [("t1", 300), ("t2", 200), ("t3", 100)] {
            cache.append("u1", &item(id, ts)).await.unwrap();
        }

        let page = cache
            .range("u1", RangeWindow::new(Boundary::Newest), 2)
            .await
            .unwrap();
        assert_eq!(post_ids(&page), vec!["t1", "t2"]);
        assert_eq!(page.next, RangeBoundary::Oldest(200));
    }

    #[tokio::test]
    async fn test_range_floor_is_inclusive() {
        let cache = InMemoryTimelineCache::new();
        for (id, ts) in [("t1", 300), ("t2", 200), ("t3", 100)] {
            cache.append("u1", &item(id, ts)).await.unwrap();
        }

        let window = RangeWindow::new(Boundary::Newest).with_floor(Some(200));
        let page = cache.range("u1", window, 10).await.unwrap();
        assert_eq!(post_ids(&page), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_missing_row_is_empty() {
        let cache = InMemoryTimelineCache::new();
        let page = cache
            .range("nobody", RangeWindow::new(Boundary::Newest), 5)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next, RangeBoundary::Exhausted);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_further_use() {
        let cache = InMemoryTimelineCache::new();
        cache.close().await.unwrap();
        cache.close().await.unwrap();

        let result = cache.append("u1", &item("p1", 1)).await;
        assert!(matches!(result, Err(AppError::CacheClosed)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_same_row() {
        let cache = std::sync::Arc::new(InMemoryTimelineCache::new());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..50 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.append("hot", &item(&format!("p{}", i), i)).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(cache.row_len("hot").await, 50);
    }
}
