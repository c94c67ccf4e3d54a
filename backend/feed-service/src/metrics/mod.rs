//! Prometheus metrics for feed-service
//!
//! - `fanout`: write path (messages, appends, classification)
//! - `feed`: read path (requests, degradations)

mod fanout;
mod feed;

pub use fanout::{record_append, record_classification, record_fanout_duration, record_message};
pub use feed::{record_degraded, record_feed_request};

use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

/// `/metrics` handler
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
