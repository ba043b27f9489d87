//! The external source of entity state polled by the update loop.
//!
//! The orchestration API client lives outside this crate. The update loop
//! only needs "fetch the current list of entities", which the
//! [`EntitySource`] trait abstracts. [`MockSource`](crate::mock::MockSource)
//! is the in-tree implementation used when no API is configured.

use std::future::Future;

use opsview_types::Entity;

/// Errors returned by an entity source. All of them are transient.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("source unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The source answered with data that could not be interpreted.
    #[error("malformed source data: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

/// A source of entity state.
///
/// Implementations return every entity currently known, each with its
/// full document. Entities missing from a result are considered removed.
pub trait EntitySource: Send + Sync + 'static {
    /// Fetch the current entities.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the poll fails. The update loop
    /// commits nothing for that cycle and retries on the next one.
    fn fetch(&self) -> impl Future<Output = Result<Vec<Entity>, SourceError>> + Send;
}
