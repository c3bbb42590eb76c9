//! AWSv4 gateway library -- a signing proxy for S3-compatible object
//! storage.
//!
//! The gateway accepts plain GET/HEAD/PUT/DELETE requests, signs them
//! with AWS Signature Version 4 using credentials the client never
//! sees, and relays the upstream response.  An auth-only mode returns
//! the signed headers and a predicted cache key without contacting the
//! upstream at all.

pub mod cache_key;
pub mod config;
pub mod errors;
pub mod server;
pub mod signing;
pub mod upstream;

use crate::config::Settings;

/// Shared application state passed to all handlers via
/// `axum::extract::State`.
pub struct AppState {
    /// Immutable per-process settings.
    pub settings: Settings,
    /// Pooled outbound HTTP client, built once at startup.
    pub upstream: reqwest::Client,
}
