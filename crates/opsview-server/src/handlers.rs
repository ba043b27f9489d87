//! Plain HTTP endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | `OK`, or 503 while draining |
//! | `POST` | `/screen-tokens` | Issue a screen token |
//! | `GET` | `/screen/{token}` | Redeem a screen token for the requester |
//!
//! The event stream lives in [`crate::stream`].

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use opsview_store::Store;
use serde::Serialize;
use tracing::info;

use crate::error::ServerError;
use crate::state::AppState;

/// Address used when neither a forwarding header nor the peer is known.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Response body of `POST /screen-tokens`.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    /// The new token.
    pub token: String,
}

/// Response body of a successful `GET /screen/{token}`.
#[derive(Debug, Serialize)]
pub struct RedeemedToken {
    /// The redeemed token.
    pub token: String,
    /// Address the token was redeemed for.
    pub address: String,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health<S: Store>(State(state): State<AppState<S>>) -> impl IntoResponse {
    if state.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "OK")
    }
}

// ---------------------------------------------------------------------------
// POST /screen-tokens
// ---------------------------------------------------------------------------

/// Issue a new screen token.
///
/// # Errors
///
/// Returns [`ServerError::Store`] when the registry is unreachable.
pub async fn create_screen_token<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<(StatusCode, Json<IssuedToken>), ServerError> {
    let token = state.store.create_screen_token().await?;
    info!("Issued screen token");
    Ok((StatusCode::CREATED, Json(IssuedToken { token })))
}

// ---------------------------------------------------------------------------
// GET /screen/{token}
// ---------------------------------------------------------------------------

/// Redeem a screen token for the requesting address.
///
/// # Errors
///
/// Returns [`ServerError::Unauthorized`] when the token is unknown,
/// expired, or already used, and [`ServerError::Store`] when the
/// registry is unreachable.
pub async fn redeem_screen_token<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Json<RedeemedToken>, ServerError> {
    let address = requester_address(&headers, &extensions);
    info!(%address, "Redeeming screen token");
    state.store.redeem_screen_token(&token, &address).await?;
    Ok(Json(RedeemedToken { token, address }))
}

/// The first `X-Forwarded-For` entry, else the peer IP.
fn requester_address(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned())
}
