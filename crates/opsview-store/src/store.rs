//! The [`Store`] contract shared by every backend.
//!
//! A store holds the latest document of every tracked entity, the ordered
//! entity index, the coordination lock, the event channel, and the screen
//! token registry. All operations are safe to call concurrently from any
//! number of tasks; the Redis backend is additionally safe across processes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use opsview_types::{Document, Event, LockToken, PublishedEvent};

use crate::error::StoreError;

/// A stream of events delivered to one listener.
///
/// Each item is shared with every other listener of the same publish.
/// The stream only ends when the backend can no longer guarantee it has
/// delivered every event (see [`Fanout::reset`](crate::Fanout::reset)).
/// Dropping it releases the listener's queue and subscription.
pub type EventStream = BoxStream<'static, Arc<PublishedEvent>>;

/// Storage, coordination, and pub/sub operations for entity state.
pub trait Store: Clone + Send + Sync + 'static {
    /// Read the last-written document for `key`, or `None` if never set.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Atomically overwrite the document for `key`.
    fn set(
        &self,
        key: &str,
        value: &Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read the entity index (empty if never written).
    fn list_index(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Replace the entity index in full.
    fn set_index(&self, keys: &[String]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deliver `event` to every current listener.
    ///
    /// Listeners that subscribe later never see it.
    fn publish(&self, event: &Event) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Start listening for events published from now on, in publish order.
    fn listen(&self) -> impl Future<Output = Result<EventStream, StoreError>> + Send;

    /// Lease granted by [`acquire_lock`](Self::acquire_lock) and
    /// [`renew_lock`](Self::renew_lock).
    fn lock_lease(&self) -> Duration;

    /// Try to take the coordination lock without blocking.
    ///
    /// Returns `None` when another holder has an unexpired lease.
    fn acquire_lock(&self) -> impl Future<Output = Result<Option<LockToken>, StoreError>> + Send;

    /// Extend the lease held by `token`.
    ///
    /// Returns `false` when the token no longer holds the lock.
    fn renew_lock(
        &self,
        token: &LockToken,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Release the lock held by `token`. A stale token is ignored.
    fn release_lock(&self, token: &LockToken)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Issue a new, unguessable screen token.
    fn create_screen_token(&self) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Redeem `token` for `address`.
    ///
    /// Fails with [`StoreError::Unauthorized`] when the token is unknown,
    /// expired, or already redeemed in a way the token policy forbids.
    /// Concurrent redemptions of a single-use token grant at most one.
    fn redeem_screen_token(
        &self,
        token: &str,
        address: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
