/// gRPC clients for calling other services
///
/// Feed Service orchestrates data from GraphService (follows/celebrities),
/// PostService (post bodies and counts) and UserService (display names).
/// Every call runs under its own timeout so a slow dependency cannot stall
/// a fan-out task or a feed request indefinitely.
use crate::error::{AppError, Result};
use crate::grpc::proto::content::v1::{post_service_client::PostServiceClient, GetPostsRequest};
use crate::grpc::proto::graph::v1::{
    graph_service_client::GraphServiceClient, GetFollowedCelebritiesRequest, GetFollowersRequest,
    IsCelebrityRequest,
};
use crate::grpc::proto::user::v1::{user_service_client::UserServiceClient, GetDisplayNamesRequest};
use crate::models::PostRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Response, Status};
use tracing::warn;

/// Social-graph contract: follow relationships and celebrity classification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn is_celebrity(&self, user_id: &str) -> Result<bool>;
    async fn get_followers(&self, user_id: &str) -> Result<Vec<String>>;
    async fn get_followed_celebrities(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Post-content contract, batched by id list.
#[async_trait]
pub trait PostContent: Send + Sync {
    async fn get_posts(&self, post_ids: &[String]) -> Result<Vec<PostRecord>>;
}

/// User-profile contract.
#[async_trait]
pub trait UserProfiles: Send + Sync {
    async fn get_display_names(&self, user_ids: &[String]) -> Result<HashMap<String, String>>;
}

/// Build a lazily connected channel; the first call establishes the connection.
pub fn lazy_channel(url: &str, connect_timeout: Duration) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(url.to_string())
        .map_err(|e| AppError::Config(format!("invalid gRPC endpoint '{}': {}", url, e)))?;
    Ok(endpoint.connect_timeout(connect_timeout).connect_lazy())
}

/// Run one unary call under `after`, mapping both failure kinds to AppError.
async fn call_with_timeout<T, F>(
    service: &'static str,
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<Response<T>, Status>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(Ok(response)) => Ok(response.into_inner()),
        Ok(Err(status)) => {
            warn!(service, operation, code = ?status.code(), "gRPC call failed: {}", status.message());
            Err(AppError::downstream(service, &status))
        }
        Err(_) => {
            warn!(service, operation, timeout_ms = after.as_millis() as u64, "gRPC call timed out");
            Err(AppError::Timeout { operation, after })
        }
    }
}

/// Graph Service gRPC Client
#[derive(Clone)]
pub struct GraphClient {
    client: GraphServiceClient<Channel>,
    timeout: Duration,
    classify_timeout: Duration,
}

impl GraphClient {
    pub fn new(channel: Channel, timeout: Duration, classify_timeout: Duration) -> Self {
        Self {
            client: GraphServiceClient::new(channel),
            timeout,
            classify_timeout,
        }
    }
}

#[async_trait]
impl SocialGraph for GraphClient {
    async fn is_celebrity(&self, user_id: &str) -> Result<bool> {
        let mut client = self.client.clone();
        let resp = call_with_timeout(
            "graph-service",
            "IsCelebrity",
            self.classify_timeout,
            client.is_celebrity(IsCelebrityRequest {
                user_id: user_id.to_string(),
            }),
        )
        .await?;
        Ok(resp.is_celebrity)
    }

    async fn get_followers(&self, user_id: &str) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let resp = call_with_timeout(
            "graph-service",
            "GetFollowers",
            self.classify_timeout,
            client.get_followers(GetFollowersRequest {
                user_id: user_id.to_string(),
            }),
        )
        .await?;
        Ok(resp.follower_ids)
    }

    async fn get_followed_celebrities(&self, user_id: &str) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let resp = call_with_timeout(
            "graph-service",
            "GetFollowedCelebrities",
            self.timeout,
            client.get_followed_celebrities(GetFollowedCelebritiesRequest {
                user_id: user_id.to_string(),
            }),
        )
        .await?;
        Ok(resp.celebrity_ids)
    }
}

/// Post Service gRPC Client
#[derive(Clone)]
pub struct PostClient {
    client: PostServiceClient<Channel>,
    timeout: Duration,
}

impl PostClient {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        Self {
            client: PostServiceClient::new(channel),
            timeout,
        }
    }
}

#[async_trait]
impl PostContent for PostClient {
    async fn get_posts(&self, post_ids: &[String]) -> Result<Vec<PostRecord>> {
        let mut client = self.client.clone();
        let resp = call_with_timeout(
            "post-service",
            "GetPosts",
            self.timeout,
            client.get_posts(GetPostsRequest {
                post_ids: post_ids.to_vec(),
            }),
        )
        .await?;

        Ok(resp
            .posts
            .into_iter()
            .map(|p| PostRecord {
                post_id: p.post_id,
                author_id: p.author_id,
                content: p.content,
                created_at: p.created_at,
                like_count: p.likes_count,
                comment_count: p.comments_count,
            })
            .collect())
    }
}

/// User Service gRPC Client
#[derive(Clone)]
pub struct UserClient {
    client: UserServiceClient<Channel>,
    timeout: Duration,
}

impl UserClient {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        Self {
            client: UserServiceClient::new(channel),
            timeout,
        }
    }
}

#[async_trait]
impl UserProfiles for UserClient {
    async fn get_display_names(&self, user_ids: &[String]) -> Result<HashMap<String, String>> {
        let mut client = self.client.clone();
        let resp = call_with_timeout(
            "user-service",
            "GetDisplayNames",
            self.timeout,
            client.get_display_names(GetDisplayNamesRequest {
                user_ids: user_ids.to_vec(),
            }),
        )
        .await?;
        Ok(resp.display_names)
    }
}
