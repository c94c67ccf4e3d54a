//! Feed Assembler Metrics

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};
use std::time::Duration;

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "GetFeed requests by outcome (ok/error/timeout)",
        &["outcome"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_DEGRADED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_degraded_total",
        "Feed responses served without some data, by reason",
        &["reason"]
    )
    .expect("Failed to register feed degraded metric")
});

static ASSEMBLY_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_assembly_duration_seconds",
        "Duration of GetFeed assembly",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register feed assembly duration metric")
});

/// Record a finished GetFeed call
pub fn record_feed_request(outcome: &str, duration: Duration) {
    FEED_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    record_assembly_duration(duration);
}

fn record_assembly_duration(duration: Duration) {
    ASSEMBLY_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a degraded response (own_row/celebrities_unavailable/celebrity_row/profiles_unavailable/missing_posts)
pub fn record_degraded(reason: &str) {
    FEED_DEGRADED_TOTAL.with_label_values(&[reason]).inc();
}
