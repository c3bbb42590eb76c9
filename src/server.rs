//! Axum router construction and per-request dispatch.
//!
//! The [`app`] function wires one handler per verb onto `/` and
//! `/*path` and returns a ready-to-serve [`axum::Router`].
//!
//! Dispatch order per request: PUT and DELETE are gated on the `admin`
//! setting first; any path ending in `/ping` is then answered locally;
//! everything else is signed and either short-circuited (auth-only
//! mode) or forwarded upstream.  Verbs without a registered handler get
//! axum's default 405.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cache_key::compute_cache_key;
use crate::errors::GatewayError;
use crate::signing::{self, SignedRequest};
use crate::upstream::{self, UpstreamOutcome};
use crate::AppState;

/// Headers stamped on every locally generated response.
const NO_STORE_HEADERS: [(&str, &str); 2] = [
    ("cache-control", "private, no-store"),
    ("content-type", "text/plain"),
];

/// Build the axum [`Router`].
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let verbs = || {
        get(handle_get)
            .head(handle_head)
            .put(handle_put)
            .delete(handle_delete)
    };

    Router::new()
        .route("/", verbs())
        .route("/*path", verbs())
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds `Date` and `Server` headers to every
/// response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("awsv4-gateway"));

    response
}

// -- Verb handlers -----------------------------------------------------------

/// `GET /*path` -- forward, or answer `/ping` locally with a body.
async fn handle_get(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if uri.path().ends_with("/ping") {
        return Ok(ping_response(true));
    }
    dispatch(&state, Method::GET, uri.path(), &headers, body).await
}

/// `HEAD /*path` -- forward, or answer `/ping` locally without a body.
async fn handle_head(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if uri.path().ends_with("/ping") {
        return Ok(ping_response(false));
    }
    dispatch(&state, Method::HEAD, uri.path(), &headers, body).await
}

/// `PUT /*path` -- requires admin; `/ping` answers locally with a body.
async fn handle_put(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if !state.settings.admin {
        return Err(GatewayError::AdminRequired);
    }
    if uri.path().ends_with("/ping") {
        return Ok(ping_response(true));
    }
    dispatch(&state, Method::PUT, uri.path(), &headers, body).await
}

/// `DELETE /*path` -- requires admin; `/ping` answers locally without
/// a body.
async fn handle_delete(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if !state.settings.admin {
        return Err(GatewayError::AdminRequired);
    }
    if uri.path().ends_with("/ping") {
        return Ok(ping_response(false));
    }
    dispatch(&state, Method::DELETE, uri.path(), &headers, body).await
}

/// Local health-check response.  GET and PUT carry `pong\n`; HEAD and
/// DELETE carry no body.
fn ping_response(with_body: bool) -> Response {
    let body = if with_body { "pong\n" } else { "" };
    (StatusCode::OK, NO_STORE_HEADERS, body).into_response()
}

// -- Forward path ------------------------------------------------------------

/// Sign the request, then either answer with the signed headers alone
/// (auth-only mode) or execute the upstream call.
async fn dispatch(
    state: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let signed = signing::sign(&state.settings, method.as_str(), path, &body)?;

    if state.settings.auth_only || auth_only_requested(headers) {
        return Ok(auth_only_response(&signed));
    }

    let outcome = upstream::forward(&state.upstream, method, path, headers, body, &signed).await;
    Ok(outcome_response(outcome))
}

/// True when the request carries an `X-Auth-Only` header with a
/// non-empty value (any content counts as truthy).
fn auth_only_requested(headers: &HeaderMap) -> bool {
    headers
        .get("x-auth-only")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| !value.is_empty())
}

/// Answer with the signed headers and the predicted cache key, never
/// contacting the upstream.  Lets a caching layer in front of the
/// gateway locate a response without the cost of the real fetch.
fn auth_only_response(signed: &SignedRequest) -> Response {
    let cache_key = compute_cache_key(&signed.url);

    let after_scheme = signed
        .url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&signed.url);
    let (host, uri_path) = after_scheme.split_once('/').unwrap_or((after_scheme, ""));

    (
        StatusCode::OK,
        [
            ("x-cache-key", cache_key),
            ("x-host", host.to_string()),
            ("x-url", signed.url.clone()),
            ("x-uri-path", format!("/{uri_path}")),
            ("x-amz-date", signed.amz_date.clone()),
            ("x-amz-content-sha256", signed.content_sha256.clone()),
            ("authorization", signed.authorization.clone()),
            ("cache-control", "private, no-store".to_string()),
            ("content-type", "text/plain".to_string()),
        ],
    )
        .into_response()
}

/// Map an upstream outcome onto the outbound response.  Success copies
/// Content-Type, Etag and Last-Modified; failure carries only the
/// status code.
fn outcome_response(outcome: UpstreamOutcome) -> Response {
    match outcome {
        UpstreamOutcome::Success {
            status,
            content_type,
            etag,
            last_modified,
            body,
        } => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            if let Some(etag) = etag {
                if let Ok(value) = HeaderValue::from_str(&etag) {
                    headers.insert(header::ETAG, value);
                }
            }
            if let Some(last_modified) = last_modified {
                if let Ok(value) = HeaderValue::from_str(&last_modified) {
                    headers.insert(header::LAST_MODIFIED, value);
                }
            }
            (status_code(status), headers, body).into_response()
        }
        UpstreamOutcome::Failure { status } => status_code(status).into_response(),
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}
