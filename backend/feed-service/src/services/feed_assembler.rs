//! Feed assembly (read path)
//!
//! A page is built from the requester's own precomputed row plus the rows
//! of every celebrity they follow. Row reads are chained through a
//! `MergeAccumulator` whose floor only rises: once one row has returned a
//! full window down to timestamp T, nothing older than T can reach the
//! page, so later reads skip it.

use crate::cache::{RangeBoundary, RangePage, RangeWindow, TimelineCache};
use crate::cursor::{self, Boundary};
use crate::error::Result;
use crate::grpc::clients::{PostContent, SocialGraph, UserProfiles};
use crate::metrics;
use crate::models::{FeedPage, HydratedPost, PageRequest, PostRecord, TimelineEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Rows merged so far plus the chained lower bound for the next read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeAccumulator {
    items: Vec<TimelineEntry>,
    floor: Option<i64>,
}

impl MergeAccumulator {
    pub fn seed(page: RangePage) -> Self {
        let mut acc = Self::default();
        acc.absorb(page);
        acc
    }

    /// Take a row read into the merge and raise the floor if the row was cut off.
    pub fn absorb(&mut self, page: RangePage) {
        if let RangeBoundary::Oldest(oldest) = page.next {
            self.floor = Some(self.floor.map_or(oldest, |floor| floor.max(oldest)));
        }
        self.items.extend(page.items);
    }

    pub fn floor(&self) -> Option<i64> {
        self.floor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest first, ties by post id descending, one entry per post id.
    pub fn into_sorted(self) -> Vec<TimelineEntry> {
        let mut items = self.items;
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.post_id.cmp(&a.post_id))
        });

        let mut seen = HashSet::with_capacity(items.len());
        items.retain(|entry| seen.insert(entry.post_id.clone()));
        items
    }
}

/// Read each celebrity row in turn, threading the accumulator's floor into
/// the next read. A failed row is skipped and leaves the floor untouched.
pub async fn chain_celebrity_reads(
    cache: &dyn TimelineCache,
    celebrity_ids: &[String],
    before: Boundary,
    limit: usize,
    mut acc: MergeAccumulator,
) -> MergeAccumulator {
    for celebrity_id in celebrity_ids {
        let window = RangeWindow::new(before).with_floor(acc.floor());
        match cache.range(celebrity_id, window, limit).await {
            Ok(page) => {
                debug!(
                    celebrity_id = %celebrity_id,
                    items = page.items.len(),
                    floor = ?acc.floor(),
                    "Read celebrity row"
                );
                acc.absorb(page);
            }
            Err(e) => {
                warn!(
                    celebrity_id = %celebrity_id,
                    error = %e,
                    "Celebrity row read failed, skipping"
                );
                metrics::record_degraded("celebrity_row");
            }
        }
    }
    acc
}

/// Cut a sorted merge to `page_size`. A next cursor is produced only when
/// something was left over.
pub fn paginate(
    mut items: Vec<TimelineEntry>,
    page_size: usize,
) -> (Vec<TimelineEntry>, Option<String>) {
    if items.len() <= page_size {
        return (items, None);
    }

    items.truncate(page_size);
    let next_cursor = items.last().map(|last| cursor::encode(last.created_at));
    (items, next_cursor)
}

pub struct FeedAssembler {
    cache: Arc<dyn TimelineCache>,
    graph: Arc<dyn SocialGraph>,
    posts: Arc<dyn PostContent>,
    profiles: Arc<dyn UserProfiles>,
    default_page_size: usize,
}

impl FeedAssembler {
    pub fn new(
        cache: Arc<dyn TimelineCache>,
        graph: Arc<dyn SocialGraph>,
        posts: Arc<dyn PostContent>,
        profiles: Arc<dyn UserProfiles>,
        default_page_size: usize,
    ) -> Self {
        Self {
            cache,
            graph,
            posts,
            profiles,
            default_page_size,
        }
    }

    /// Assemble one page of `request.user_id`'s home timeline.
    ///
    /// Fails only when post bodies cannot be fetched. Row reads, celebrity
    /// lookups and display names degrade to a partial page.
    pub async fn get_feed(&self, request: &PageRequest) -> Result<FeedPage> {
        let before = cursor::decode(&request.cursor);
        let page_size = cursor::validate_page_size(request.page_size, self.default_page_size);
        // One extra item per row reveals whether a next page exists
        let limit = page_size.saturating_add(1);

        let acc = match self
            .cache
            .range(&request.user_id, RangeWindow::new(before), limit)
            .await
        {
            Ok(own) => MergeAccumulator::seed(own),
            Err(e) => {
                warn!(
                    user_id = %request.user_id,
                    error = %e,
                    "Own timeline row unavailable, serving celebrity rows only"
                );
                metrics::record_degraded("own_row");
                MergeAccumulator::default()
            }
        };

        let celebrity_ids = match self.graph.get_followed_celebrities(&request.user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    user_id = %request.user_id,
                    error = %e,
                    "Followed celebrities unavailable, serving own timeline only"
                );
                metrics::record_degraded("celebrities_unavailable");
                Vec::new()
            }
        };

        let acc =
            chain_celebrity_reads(self.cache.as_ref(), &celebrity_ids, before, limit, acc).await;
        let merged = acc.len();
        let (entries, next_cursor) = paginate(acc.into_sorted(), page_size);

        if entries.is_empty() {
            debug!(user_id = %request.user_id, "Empty feed page");
            return Ok(FeedPage::default());
        }

        let mut posts = self.hydrate(&entries).await?;
        self.attach_display_names(&mut posts).await;

        info!(
            user_id = %request.user_id,
            celebrities = celebrity_ids.len(),
            merged,
            returned = posts.len(),
            has_more = next_cursor.is_some(),
            "Feed assembled"
        );

        Ok(FeedPage { posts, next_cursor })
    }

    /// Fetch post bodies, keeping page order.
    async fn hydrate(&self, entries: &[TimelineEntry]) -> Result<Vec<HydratedPost>> {
        let post_ids: Vec<String> = entries.iter().map(|e| e.post_id.clone()).collect();

        let records = self.posts.get_posts(&post_ids).await.map_err(|e| {
            error!(posts = post_ids.len(), error = %e, "Post hydration failed");
            e
        })?;

        let mut by_id: HashMap<String, PostRecord> = records
            .into_iter()
            .map(|record| (record.post_id.clone(), record))
            .collect();

        let mut posts = Vec::with_capacity(entries.len());
        for entry in entries {
            match by_id.remove(&entry.post_id) {
                Some(record) => posts.push(HydratedPost::from(record)),
                None => {
                    warn!(post_id = %entry.post_id, "Post missing from content service, dropping");
                    metrics::record_degraded("missing_posts");
                }
            }
        }
        Ok(posts)
    }

    async fn attach_display_names(&self, posts: &mut [HydratedPost]) {
        let mut author_ids: Vec<String> = Vec::new();
        for post in posts.iter() {
            if !author_ids.contains(&post.author_id) {
                author_ids.push(post.author_id.clone());
            }
        }

        match self.profiles.get_display_names(&author_ids).await {
            Ok(names) => {
                for post in posts.iter_mut() {
                    post.author_display_name = names.get(&post.author_id).cloned();
                }
            }
            Err(e) => {
                warn!(
                    authors = author_ids.len(),
                    error = %e,
                    "Display names unavailable, leaving them blank"
                );
                metrics::record_degraded("profiles_unavailable");
            }
        }
    }
}
