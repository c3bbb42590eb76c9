//! Gateway error types.
//!
//! Every variant maps to an HTTP status code.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(GatewayError::AdminRequired)`.  Error responses always carry
//! `Cache-Control: private, no-store` so nothing in front of the
//! gateway holds on to them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the request path.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// PUT or DELETE attempted while administrative methods are disabled.
    #[error("administrative methods are not enabled")]
    AdminRequired,

    /// A signing-relevant setting is missing or empty.  Startup validation
    /// catches this before serving; the signing engine re-checks per call.
    #[error("missing required setting: {0}")]
    Configuration(&'static str),

    /// Catch-all for unexpected internal errors.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AdminRequired => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let headers = [
            ("cache-control", "private, no-store"),
            ("content-type", "text/plain"),
        ];

        // The admin denial answers with an empty body.
        if matches!(self, GatewayError::AdminRequired) {
            return (status, headers).into_response();
        }

        tracing::error!("{}", self);
        (status, headers, format!("{self}\n")).into_response()
    }
}
