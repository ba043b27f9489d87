//! Error types for the store layer.
//!
//! All backend failures surface as [`StoreError`]. Callers treat every
//! variant except [`StoreError::Unauthorized`] as transient: the operation
//! made no progress and can be retried on the next cycle.

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A Redis/Dragonfly operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The in-process event dispatcher has shut down.
    #[error("Event channel closed")]
    ChannelClosed,

    /// A screen token could not be redeemed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error is an authorization failure rather than a
    /// transient backend problem.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
