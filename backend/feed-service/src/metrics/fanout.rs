//! Fanout Writer Metrics

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use std::time::Duration;

static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_messages_total",
        "Post events processed by the fanout writer (committed/failed/invalid)",
        &["outcome"]
    )
    .expect("Failed to register fanout messages metric")
});

static APPENDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_appends_total",
        "Timeline row appends by fanout path and outcome",
        &["path", "outcome"]
    )
    .expect("Failed to register fanout appends metric")
});

static CLASSIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_classifications_total",
        "Author classification results (celebrity/ordinary/unknown)",
        &["result"]
    )
    .expect("Failed to register fanout classification metric")
});

static FANOUT_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_fanout_duration_seconds",
        "Time to fan out one post event",
        &["path"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .expect("Failed to register fanout duration metric")
});

/// Record a processed message by outcome
pub fn record_message(outcome: &str) {
    MESSAGES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record row appends for one fanout path
pub fn record_append(path: &str, outcome: &str, count: u64) {
    if count > 0 {
        APPENDS_TOTAL
            .with_label_values(&[path, outcome])
            .inc_by(count);
    }
}

pub fn record_classification(result: &str) {
    CLASSIFICATIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_fanout_duration(path: &str, duration: Duration) {
    FANOUT_DURATION_SECONDS
        .with_label_values(&[path])
        .observe(duration.as_secs_f64());
}
