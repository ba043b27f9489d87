//! Shared application state for the HTTP server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opsview_store::Store;

/// State shared by every request handler.
///
/// Cloning is cheap: the store is itself a shared handle and the
/// shutdown flag is reference counted.
#[derive(Debug, Clone)]
pub struct AppState<S> {
    /// Backend holding entity state, events, and screen tokens.
    pub store: S,
    shutting_down: Arc<AtomicBool>,
}

impl<S: Store> AppState<S> {
    /// Create state serving from `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the server as draining. Health checks fail from now on so
    /// load balancers stop routing new subscribers here.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Whether [`begin_shutdown`](Self::begin_shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }
}
