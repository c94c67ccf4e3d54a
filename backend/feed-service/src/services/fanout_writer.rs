//! Fanout writer (write path)
//!
//! Every post-created event is classified by its author:
//! - celebrity or unknown: one append to the author's own row (pull path),
//!   followers read it at query time
//! - ordinary: the post is appended to every follower's row (push path),
//!   one task per batch of `worker_threshold` followers
//!
//! Each message is processed on its own task. The run loop owns the
//! `OffsetTracker` and commits a partition only up to the first message
//! that has not been fully fanned out, so a failure is repaired by
//! redelivery. Appends are upserts, which makes redelivery harmless.

use crate::cache::TimelineCache;
use crate::config::FanoutConfig;
use crate::consumers::{MessagePosition, OffsetTracker, PostEventMessage, PostEventSource};
use crate::error::{AppError, Result};
use crate::grpc::clients::SocialGraph;
use crate::metrics;
use crate::models::{FeedItem, PostCreatedEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Celebrity,
    Ordinary,
    /// The graph service could not answer
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Celebrity => "celebrity",
            Classification::Ordinary => "ordinary",
            Classification::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutPath {
    Pull,
    Push,
}

impl FanoutPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanoutPath::Pull => "pull",
            FanoutPath::Push => "push",
        }
    }
}

/// Outcome of fanning out one post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub path: FanoutPath,
    pub batches: usize,
    pub appended: usize,
    pub failed: usize,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Clone)]
pub struct FanoutWriter {
    cache: Arc<dyn TimelineCache>,
    graph: Arc<dyn SocialGraph>,
    config: FanoutConfig,
}

impl FanoutWriter {
    pub fn new(
        cache: Arc<dyn TimelineCache>,
        graph: Arc<dyn SocialGraph>,
        config: FanoutConfig,
    ) -> Self {
        Self {
            cache,
            graph,
            config,
        }
    }

    pub async fn classify(&self, author_id: &str) -> Classification {
        let classification = match self.graph.is_celebrity(author_id).await {
            Ok(true) => Classification::Celebrity,
            Ok(false) => Classification::Ordinary,
            Err(e) => {
                warn!(
                    author_id = %author_id,
                    error = %e,
                    "Celebrity check failed, falling back to pull fanout"
                );
                Classification::Unknown
            }
        };
        metrics::record_classification(classification.as_str());
        classification
    }

    /// Decode one event payload and fan it out.
    pub async fn process_message(&self, payload: &[u8]) -> Result<FanoutReport> {
        let event: PostCreatedEvent = serde_json::from_slice(payload)?;
        self.fan_out(FeedItem::from(event)).await
    }

    pub async fn fan_out(&self, item: FeedItem) -> Result<FanoutReport> {
        let started = Instant::now();
        let report = match self.classify(&item.author_id).await {
            Classification::Ordinary => self.push(item).await?,
            Classification::Celebrity | Classification::Unknown => self.pull(&item).await,
        };

        metrics::record_fanout_duration(report.path.as_str(), started.elapsed());
        metrics::record_append(report.path.as_str(), "ok", report.appended as u64);
        metrics::record_append(report.path.as_str(), "failed", report.failed as u64);
        Ok(report)
    }

    /// Single append to the author's own row.
    async fn pull(&self, item: &FeedItem) -> FanoutReport {
        let (appended, failed) = match self.cache.append(&item.author_id, item).await {
            Ok(()) => (1, 0),
            Err(e) => {
                warn!(
                    post_id = %item.post_id,
                    author_id = %item.author_id,
                    error = %e,
                    "Append to author row failed"
                );
                (0, 1)
            }
        };

        debug!(post_id = %item.post_id, author_id = %item.author_id, "Pull fanout done");
        FanoutReport {
            path: FanoutPath::Pull,
            batches: 0,
            appended,
            failed,
        }
    }

    /// Append to every follower's row, one task per batch.
    async fn push(&self, item: FeedItem) -> Result<FanoutReport> {
        let followers = self.graph.get_followers(&item.author_id).await.map_err(|e| {
            error!(
                post_id = %item.post_id,
                author_id = %item.author_id,
                error = %e,
                "Failed to fetch followers, aborting fanout"
            );
            e
        })?;

        let total = followers.len();
        let item = Arc::new(item);
        let mut tasks = JoinSet::new();
        for batch in followers.chunks(self.config.worker_threshold.max(1)) {
            let batch = batch.to_vec();
            let cache = self.cache.clone();
            let item = item.clone();
            tasks.spawn(async move { append_batch(cache.as_ref(), &item, &batch).await });
        }
        let batches = tasks.len();

        let mut appended = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(count) => appended += count,
                Err(e) => error!(post_id = %item.post_id, error = %e, "Fanout batch task failed"),
            }
        }

        let report = FanoutReport {
            path: FanoutPath::Push,
            batches,
            appended,
            failed: total - appended,
        };
        debug!(
            post_id = %item.post_id,
            author_id = %item.author_id,
            followers = total,
            batches,
            failed = report.failed,
            "Push fanout done"
        );
        Ok(report)
    }

    /// Consume events until `shutdown` fires, then drain in-flight fanout
    /// for up to `shutdown_grace`, commit what finished and close the source.
    pub async fn run<S>(self, mut source: S, mut shutdown: broadcast::Receiver<()>) -> Result<()>
    where
        S: PostEventSource,
    {
        let mut tracker = OffsetTracker::new();
        let mut in_flight: JoinSet<(MessagePosition, Result<FanoutReport>)> = JoinSet::new();
        info!(
            worker_threshold = self.config.worker_threshold,
            "Fanout writer started"
        );

        loop {
            let step = tokio::select! {
                _ = shutdown.recv() => Step::Shutdown,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => Step::Finished(joined),
                polled = source.poll(self.config.poll_timeout) => Step::Polled(polled),
            };

            match step {
                Step::Shutdown => break,
                Step::Finished(joined) => {
                    settle(&mut tracker, joined);
                    commit_ready(&mut source, &mut tracker).await;
                }
                Step::Polled(Ok(Some(message))) => self.dispatch(&mut in_flight, &mut tracker, message),
                Step::Polled(Ok(None)) => {}
                Step::Polled(Err(e)) => {
                    error!(error = %e, "Post event poll failed");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }

        info!(in_flight = in_flight.len(), "Fanout writer draining");
        let drain = async {
            while let Some(joined) = in_flight.join_next().await {
                settle(&mut tracker, joined);
            }
        };
        if tokio::time::timeout(self.config.shutdown_grace, drain).await.is_err() {
            warn!(
                abandoned = in_flight.len(),
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Drain deadline passed, aborting remaining fanout"
            );
            in_flight.abort_all();
        }

        commit_ready(&mut source, &mut tracker).await;
        source.close().await?;
        info!(uncommitted = tracker.pending(), "Fanout writer stopped");
        Ok(())
    }

    fn dispatch(
        &self,
        in_flight: &mut JoinSet<(MessagePosition, Result<FanoutReport>)>,
        tracker: &mut OffsetTracker,
        message: PostEventMessage,
    ) {
        tracker.begin(&message.position);
        let writer = self.clone();
        in_flight.spawn(async move {
            let result = writer.process_message(&message.payload).await;
            (message.position, result)
        });
    }
}

enum Step {
    Shutdown,
    Polled(Result<Option<PostEventMessage>>),
    Finished(std::result::Result<(MessagePosition, Result<FanoutReport>), JoinError>),
}

/// Append `item` to each follower row in turn; returns the number of successes.
async fn append_batch(cache: &dyn TimelineCache, item: &FeedItem, followers: &[String]) -> usize {
    let mut appended = 0;
    for follower_id in followers {
        match cache.append(follower_id, item).await {
            Ok(()) => appended += 1,
            Err(e) => warn!(
                post_id = %item.post_id,
                follower_id = %follower_id,
                error = %e,
                "Append to follower row failed"
            ),
        }
    }
    appended
}

fn settle(
    tracker: &mut OffsetTracker,
    joined: std::result::Result<(MessagePosition, Result<FanoutReport>), JoinError>,
) {
    match joined {
        Ok((position, Ok(report))) if report.is_complete() => {
            tracker.complete(&position);
            metrics::record_message("ok");
        }
        Ok((position, Ok(report))) => {
            warn!(
                partition = position.partition,
                offset = position.offset,
                appended = report.appended,
                failed = report.failed,
                "Partial fanout, leaving offset uncommitted"
            );
            tracker.fail(&position);
            metrics::record_message("partial");
        }
        Ok((position, Err(AppError::InvalidEvent(e)))) => {
            error!(
                partition = position.partition,
                offset = position.offset,
                error = %e,
                "Undecodable post event, leaving offset uncommitted"
            );
            tracker.fail(&position);
            metrics::record_message("invalid");
        }
        Ok((position, Err(e))) => {
            error!(
                partition = position.partition,
                offset = position.offset,
                error = %e,
                "Fanout failed, leaving offset uncommitted"
            );
            tracker.fail(&position);
            metrics::record_message("failed");
        }
        // Position is lost with the task; the offset stays pending
        Err(e) => {
            error!(error = %e, "Fanout task aborted");
            metrics::record_message("aborted");
        }
    }
}

async fn commit_ready<S: PostEventSource>(source: &mut S, tracker: &mut OffsetTracker) {
    for commit in tracker.take_commits() {
        if let Err(e) = source.commit(&commit).await {
            warn!(
                topic = %commit.topic,
                partition = commit.partition,
                next_offset = commit.next_offset,
                error = %e,
                "Offset commit failed"
            );
        }
    }
}
