//! Pagination cursor codec
//!
//! A cursor is the standard-base64 encoding of a decimal `created_at`
//! boundary. It carries no authority: anything that fails to decode is
//! treated as "start from newest" instead of failing the request.

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

/// Page size used when the caller sends a non-positive value
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound of a timeline range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// No bound: start from the newest item
    Newest,
    /// Only items with `created_at` strictly below this value
    Before(i64),
}

impl Boundary {
    pub fn admits(&self, created_at: i64) -> bool {
        match self {
            Boundary::Newest => true,
            Boundary::Before(limit) => created_at < *limit,
        }
    }
}

/// Decode a cursor token; empty or malformed tokens yield `Boundary::Newest`.
pub fn decode(token: &str) -> Boundary {
    let token = token.trim();
    if token.is_empty() {
        return Boundary::Newest;
    }

    let decoded = match general_purpose::STANDARD.decode(token) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Invalid cursor encoding, starting from newest");
            return Boundary::Newest;
        }
    };

    let Ok(text) = String::from_utf8(decoded) else {
        debug!("Cursor payload is not UTF-8, starting from newest");
        return Boundary::Newest;
    };

    if text.is_empty() {
        debug!("Cursor decoded to empty payload, starting from newest");
        return Boundary::Newest;
    }

    match text.parse::<i64>() {
        Ok(ts) => Boundary::Before(ts),
        Err(_) => {
            debug!(payload = %text, "Cursor payload is not a timestamp, starting from newest");
            Boundary::Newest
        }
    }
}

/// Encode a `created_at` boundary as an opaque, transport-safe token.
pub fn encode(created_at: i64) -> String {
    general_purpose::STANDARD.encode(created_at.to_string())
}

/// Clamp a requested page size; non-positive values use `default`.
pub fn validate_page_size(requested: i32, default: usize) -> usize {
    if requested <= 0 {
        debug!(requested, default, "Invalid page size, using default");
        default
    } else {
        requested as usize
    }
}
