//! Axum router construction.
//!
//! Assembles all routes into a single [`Router`] with CORS middleware
//! enabled so dashboards served from another origin can subscribe.

use axum::Router;
use axum::routing::{get, post};
use opsview_store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::stream;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health` -- liveness probe
/// - `GET /events` -- SSE stream of entity snapshots and updates
/// - `POST /screen-tokens` -- issue a screen token
/// - `GET /screen/{token}` -- redeem a screen token
pub fn build_router<S: Store>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::<S>))
        // Event stream
        .route("/events", get(stream::events::<S>))
        // Screen tokens
        .route("/screen-tokens", post(handlers::create_screen_token::<S>))
        .route("/screen/{token}", get(handlers::redeem_screen_token::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
