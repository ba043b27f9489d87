//! Error types for the ops view HTTP server.
//!
//! [`ServerError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opsview_store::StoreError;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The caller presented an unknown, expired, or already-used token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The store could not serve the request. Transient.
    #[error("store unavailable: {0}")]
    Store(StoreError),

    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized(msg) => Self::Unauthorized(msg),
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Store(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            Self::Bind(msg) | Self::Serve(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
