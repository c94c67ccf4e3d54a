/// Error types for feed-service
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Timeline cache error: {0}")]
    Cache(String),

    #[error("Timeline cache is closed")]
    CacheClosed,

    #[error("{service} call failed: {message}")]
    Downstream {
        service: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Invalid post event payload: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn downstream(service: &'static str, status: &tonic::Status) -> Self {
        AppError::Downstream {
            service,
            message: format!("{:?}: {}", status.code(), status.message()),
        }
    }
}

/// Convert AppError to tonic::Status for gRPC responses.
///
/// Details stay in the logs; callers only see the status class. A downstream
/// timeout is an internal failure here: `DEADLINE_EXCEEDED` is reserved for
/// the request deadline enforced by the server.
impl From<AppError> for tonic::Status {
    fn from(_err: AppError) -> Self {
        tonic::Status::internal("Failed to get feed due to internal issues")
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
