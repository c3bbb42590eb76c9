//! Signed request forwarding to the upstream backend.
//!
//! One pooled `reqwest` client is built at startup from the configured
//! timeouts and shared by every request.  Each inbound request yields at
//! most one outbound attempt; there is no retry layer.

use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::signing::SignedRequest;

/// Status reported when no upstream response was received at all
/// (connect failure, timeout, truncated body).
pub const STATUS_NO_RESPONSE: u16 = 599;

/// Conditional request headers passed through to the upstream verbatim.
const PASSTHROUGH_HEADERS: [header::HeaderName; 2] =
    [header::IF_MODIFIED_SINCE, header::IF_NONE_MATCH];

/// Outcome of one outbound call.
///
/// On `Failure` no upstream headers or body propagate; the caller sees
/// only the status code.
#[derive(Debug)]
pub enum UpstreamOutcome {
    /// The upstream answered 2xx.
    Success {
        status: u16,
        content_type: String,
        etag: Option<String>,
        last_modified: Option<String>,
        body: Bytes,
    },
    /// The upstream answered non-2xx, or never answered at all.
    Failure { status: u16 },
}

/// Build the process-wide pooled HTTP client from the configured
/// connect and request timeouts.
pub fn build_client(settings: &Settings) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout))
        .timeout(Duration::from_secs(settings.request_timeout))
        .build()?;
    Ok(client)
}

/// Execute one signed request against the upstream.
///
/// For PUT the inbound body is attached with a `Content-Type` guessed
/// from the path extension.  Logs one line per completed call: status,
/// method, effective URL, duration in milliseconds, body size in bytes.
pub async fn forward(
    client: &reqwest::Client,
    method: Method,
    path: &str,
    incoming: &HeaderMap,
    body: Bytes,
    signed: &SignedRequest,
) -> UpstreamOutcome {
    let started = Instant::now();

    let mut request = client
        .request(method.clone(), signed.url.as_str())
        .header("x-amz-date", &signed.amz_date)
        .header("x-amz-content-sha256", &signed.content_sha256)
        .header(header::AUTHORIZATION, &signed.authorization);

    for name in PASSTHROUGH_HEADERS {
        if let Some(value) = incoming.get(&name) {
            request = request.header(name, value.clone());
        }
    }

    if method == Method::PUT {
        request = request
            .header(header::CONTENT_TYPE, guess_content_type(path))
            .body(body);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            debug!("upstream call failed: {err}");
            warn!(
                "{} {} {} {:.2}ms 0B",
                STATUS_NO_RESPONSE,
                method,
                signed.url,
                elapsed_ms(started),
            );
            return UpstreamOutcome::Failure {
                status: STATUS_NO_RESPONSE,
            };
        }
    };

    let status = response.status();
    let content_type = header_string(response.headers(), &header::CONTENT_TYPE)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let etag = header_string(response.headers(), &header::ETAG);
    let last_modified = header_string(response.headers(), &header::LAST_MODIFIED);

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            debug!("upstream body read failed: {err}");
            warn!(
                "{} {} {} {:.2}ms 0B",
                STATUS_NO_RESPONSE,
                method,
                signed.url,
                elapsed_ms(started),
            );
            return UpstreamOutcome::Failure {
                status: STATUS_NO_RESPONSE,
            };
        }
    };

    if status.is_success() {
        info!(
            "{} {} {} {:.2}ms {}B",
            status.as_u16(),
            method,
            signed.url,
            elapsed_ms(started),
            body.len(),
        );
        UpstreamOutcome::Success {
            status: status.as_u16(),
            content_type,
            etag,
            last_modified,
            body,
        }
    } else {
        warn!(
            "{} {} {} {:.2}ms {}B",
            status.as_u16(),
            method,
            signed.url,
            elapsed_ms(started),
            body.len(),
        );
        UpstreamOutcome::Failure {
            status: status.as_u16(),
        }
    }
}

/// Guess the write Content-Type from the path's file extension.
pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn header_string(headers: &HeaderMap, name: &header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
