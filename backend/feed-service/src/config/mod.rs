use crate::error::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub grpc: GrpcConfig,
    pub fanout: FanoutConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub grpc_port: u16,
    pub http_port: u16,
    /// How long health reports "down" before servers stop accepting work
    pub shutdown_drain: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(AppError::Config(format!("unknown CACHE_BACKEND '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub backend: CacheBackend,
    pub key_prefix: String,
    /// Newest items kept per timeline row
    pub max_row_size: usize,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub offset_reset: String,
    pub fetch_min_bytes: String,
}

#[derive(Debug, Clone)]
pub struct GrpcConfig {
    pub social_graph_url: String,
    pub post_service_url: String,
    pub user_service_url: String,
    pub downstream_timeout: Duration,
    pub classify_timeout: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Followers appended sequentially by one batch task
    pub worker_threshold: usize,
    pub poll_timeout: Duration,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub default_page_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            worker_threshold: 100,
            poll_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: crate::cursor::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; the environment may already be populated
        let _ = dotenvy::dotenv();

        let worker_threshold: usize = env_parse("FANOUT_WORKER_THRESHOLD", 100)?;
        if worker_threshold == 0 {
            return Err(AppError::Config(
                "FANOUT_WORKER_THRESHOLD must be at least 1".to_string(),
            ));
        }

        let default_page_size: usize =
            env_parse("FEED_DEFAULT_PAGE_SIZE", crate::cursor::DEFAULT_PAGE_SIZE)?;
        if default_page_size == 0 {
            return Err(AppError::Config(
                "FEED_DEFAULT_PAGE_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                grpc_port: env_parse("GRPC_PORT", 9084)?,
                http_port: env_parse("HTTP_PORT", 8084)?,
                shutdown_drain: Duration::from_secs(env_parse("SHUTDOWN_DRAIN_SECS", 5)?),
            },
            redis: RedisConfig {
                url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
                backend: env_or("CACHE_BACKEND", "redis").parse()?,
                key_prefix: env_or("TIMELINE_KEY_PREFIX", "timeline"),
                max_row_size: env_parse("TIMELINE_MAX_ROW_SIZE", 800)?,
            },
            kafka: KafkaConfig {
                bootstrap_servers: env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
                group_id: env_or("KAFKA_GROUP_ID", "feed-fanout-writer"),
                topics: parse_topics(&env_or("KAFKA_TOPICS", "posts.created")),
                offset_reset: env_or("KAFKA_OFFSET_RESET", "earliest"),
                fetch_min_bytes: env_or("KAFKA_FETCH_MIN_BYTES", "1"),
            },
            grpc: GrpcConfig {
                social_graph_url: env_or("SOCIAL_GRAPH_URL", "http://127.0.0.1:50051"),
                post_service_url: env_or("POST_SERVICE_URL", "http://127.0.0.1:50052"),
                user_service_url: env_or("USER_SERVICE_URL", "http://127.0.0.1:50053"),
                downstream_timeout: Duration::from_millis(env_parse("DOWNSTREAM_TIMEOUT_MS", 2000)?),
                classify_timeout: Duration::from_millis(env_parse("CLASSIFY_TIMEOUT_MS", 5000)?),
                request_timeout: Duration::from_millis(env_parse("REQUEST_TIMEOUT_MS", 8000)?),
            },
            fanout: FanoutConfig {
                worker_threshold,
                poll_timeout: Duration::from_millis(env_parse("FANOUT_POLL_TIMEOUT_MS", 100)?),
                shutdown_grace: Duration::from_secs(env_parse("FANOUT_SHUTDOWN_GRACE_SECS", 30)?),
            },
            feed: FeedConfig { default_page_size },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("invalid {}='{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics_skips_blanks() {
        assert_eq!(
            parse_topics("posts.created, posts.replayed,,"),
            vec!["posts.created".to_string(), "posts.replayed".to_string()]
        );
        assert!(parse_topics("").is_empty());
    }

    #[test]
    fn test_cache_backend_from_str() {
        assert_eq!("redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!("MEMORY".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("FEED_TEST_BAD_NUMBER", "twelve");
        let parsed: Result<u64> = env_parse("FEED_TEST_BAD_NUMBER", 1);
        assert!(matches!(parsed, Err(AppError::Config(_))));

        let missing: u64 = env_parse("FEED_TEST_MISSING_NUMBER", 7).unwrap();
        assert_eq!(missing, 7);
    }

    #[test]
    fn test_fanout_defaults() {
        let config = FanoutConfig::default();
        assert_eq!(config.worker_threshold, 100);
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
    }
}
