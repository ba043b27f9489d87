//! HTTP surface of the ops view.
//!
//! Serves the entity event stream over server-sent events, the screen
//! token endpoints, and a health probe. Every handler is generic over the
//! [`Store`](opsview_store::Store) backend.
//!
//! # Modules
//!
//! - [`router`] -- Route table, CORS, and request tracing
//! - [`stream`] -- `GET /events` SSE stream
//! - [`handlers`] -- Health and screen token endpoints
//! - [`state`] -- Shared [`AppState`]
//! - [`server`] -- Bind, serve, and shutdown
//! - [`error`] -- [`ServerError`] and its HTTP mapping

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod stream;

pub use error::ServerError;
pub use router::build_router;
pub use server::{shutdown_signal, start_server};
pub use state::AppState;
