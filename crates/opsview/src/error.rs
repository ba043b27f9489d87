//! Error types for the service binary.

/// Top-level error for the service binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: opsview_core::ConfigError,
    },

    /// The store backend could not be set up.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: opsview_store::StoreError,
    },

    /// The HTTP server failed to start or stopped with an error.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: opsview_server::ServerError,
    },
}
