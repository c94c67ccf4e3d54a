//! gRPC server for FeedService
//!
//! `GetFeed` is the only read surface. The handler bounds the whole
//! assembly by the request timeout and maps domain errors to status codes
//! without leaking downstream details.

pub mod clients;

pub use clients::{
    lazy_channel, GraphClient, PostClient, PostContent, SocialGraph, UserClient, UserProfiles,
};

use crate::metrics;
use crate::models::{HydratedPost, PageRequest};
use crate::services::FeedAssembler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::{Request, Response, Status};
use tracing::{debug, error, warn};

// Generated protobuf types and service traits
pub mod proto {
    pub mod feed {
        pub mod v1 {
            tonic::include_proto!("feed.v1");
        }
    }
    pub mod graph {
        pub mod v1 {
            tonic::include_proto!("graph.v1");
        }
    }
    pub mod content {
        pub mod v1 {
            tonic::include_proto!("content.v1");
        }
    }
    pub mod user {
        pub mod v1 {
            tonic::include_proto!("user.v1");
        }
    }
}

pub use proto::feed::v1::{
    feed_service_server, FeedPost, GetFeedRequest, GetFeedResponse,
};

/// FeedService gRPC server implementation
#[derive(Clone)]
pub struct FeedServiceImpl {
    assembler: Arc<FeedAssembler>,
    request_timeout: Duration,
}

impl FeedServiceImpl {
    pub fn new(assembler: Arc<FeedAssembler>, request_timeout: Duration) -> Self {
        Self {
            assembler,
            request_timeout,
        }
    }

    pub fn into_server(self) -> feed_service_server::FeedServiceServer<Self> {
        feed_service_server::FeedServiceServer::new(self)
    }
}

impl From<HydratedPost> for FeedPost {
    fn from(post: HydratedPost) -> Self {
        FeedPost {
            post_id: post.post_id,
            user_id: post.author_id,
            username: post.author_display_name.unwrap_or_default(),
            content: post.content,
            created_at: post.created_at,
            likes_count: post.like_count,
            comments_count: post.comment_count,
        }
    }
}

#[tonic::async_trait]
impl feed_service_server::FeedService for FeedServiceImpl {
    async fn get_feed(
        &self,
        request: Request<GetFeedRequest>,
    ) -> Result<Response<GetFeedResponse>, Status> {
        let req = request.into_inner();
        let page_request = PageRequest::new(req.user_id, req.cursor, req.page_size);
        debug!(
            user_id = %page_request.user_id,
            page_size = page_request.page_size,
            "GetFeed request"
        );

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.request_timeout, self.assembler.get_feed(&page_request))
                .await;

        match outcome {
            Ok(Ok(page)) => {
                metrics::record_feed_request("ok", started.elapsed());
                Ok(Response::new(GetFeedResponse {
                    posts: page.posts.into_iter().map(FeedPost::from).collect(),
                    next_cursor: page.next_cursor.unwrap_or_default(),
                }))
            }
            Ok(Err(e)) => {
                error!(user_id = %page_request.user_id, error = %e, "Failed to assemble feed");
                metrics::record_feed_request("error", started.elapsed());
                Err(Status::from(e))
            }
            Err(_) => {
                warn!(
                    user_id = %page_request.user_id,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Feed request exceeded deadline"
                );
                metrics::record_feed_request("timeout", started.elapsed());
                Err(Status::deadline_exceeded("Feed request timed out"))
            }
        }
    }
}
