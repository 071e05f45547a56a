//! Application error type mapping to HTTP responses.
//!
//! The orchestrator treats any non-2xx reply as a failed delivery and only
//! surfaces the body text, so every error is a `400` with a plain-text
//! `Webhook Error: <message>` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use fns_core::{HandlerError, SecurityError};

#[derive(Debug)]
pub enum AppError {
    /// Signature or payload rejected.
    Security(SecurityError),
    /// Invocation could not start.
    Handler(HandlerError),
    /// Request body was not readable.
    BadRequest(String),
}

impl From<SecurityError> for AppError {
    fn from(e: SecurityError) -> Self {
        AppError::Security(e)
    }
}

impl From<HandlerError> for AppError {
    fn from(e: HandlerError) -> Self {
        AppError::Handler(e)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Security(e) => write!(f, "{e}"),
            AppError::Handler(e) => write!(f, "{e}"),
            AppError::BadRequest(msg) => f.write_str(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = format!("Webhook Error: {self}");
        tracing::warn!(error = %self, "rejecting request");
        (StatusCode::BAD_REQUEST, message).into_response()
    }
}
