pub mod cache;
pub mod config;
pub mod consumers;
pub mod cursor;
pub mod error;
pub mod grpc;
pub mod metrics;
pub mod models;
pub mod services;

pub use cache::{InMemoryTimelineCache, RedisTimelineCache, TimelineCache, TimelineCacheConfig};
pub use config::Config;
pub use error::{AppError, Result};
pub use services::{FanoutWriter, FeedAssembler};
