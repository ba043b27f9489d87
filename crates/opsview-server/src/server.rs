//! HTTP server lifecycle management.
//!
//! Provides [`start_server`] which binds to a TCP address and serves the
//! router until the given shutdown future resolves, and
//! [`shutdown_signal`] which resolves on `Ctrl-C` or `SIGTERM`.

use std::future::{Future, IntoFuture as _};
use std::net::SocketAddr;

use opsview_store::Store;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::router::build_router;
use crate::state::AppState;

/// Start the HTTP server on `bind_address` (`host:port`).
///
/// Peer addresses are recorded for every connection so screen token
/// redemption can fall back to them. Event streams never end on their
/// own, so shutdown stops serving outright once `shutdown` resolves
/// instead of waiting for open connections to drain.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or cannot be
/// bound, or [`ServerError::Serve`] on a fatal I/O error.
pub async fn start_server<S, F>(
    bind_address: &str,
    state: AppState<S>,
    shutdown: F,
) -> Result<(), ServerError>
where
    S: Store,
    F: Future<Output = ()> + Send,
{
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address {bind_address}: {e}")))?;

    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "Ops view server listening");

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .into_future();

    tokio::select! {
        result = serve => result.map_err(|e| ServerError::Serve(format!("serve error: {e}"))),
        () = shutdown => {
            info!("Ops view server stopped");
            Ok(())
        }
    }
}

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received TERM signal"),
    }
}
