//! Runtime selection between the store backends.

use std::time::Duration;

use opsview_types::{Document, Event, LockToken};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::redis::RedisStore;
use crate::store::{EventStream, Store};

/// Either store backend, chosen from configuration at startup.
#[derive(Clone)]
pub enum AnyStore {
    /// Single-process backend.
    Memory(MemoryStore),
    /// Shared Redis/Dragonfly backend.
    Redis(RedisStore),
}

impl AnyStore {
    /// Short backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

impl From<MemoryStore> for AnyStore {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

impl From<RedisStore> for AnyStore {
    fn from(store: RedisStore) -> Self {
        Self::Redis(store)
    }
}

/// Forward a [`Store`] call to whichever backend is active.
macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Memory($store) => $call.await,
            AnyStore::Redis($store) => $call.await,
        }
    };
}

impl Store for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        delegate!(self, s => s.get(key))
    }

    async fn set(&self, key: &str, value: &Document) -> Result<(), StoreError> {
        delegate!(self, s => s.set(key, value))
    }

    async fn list_index(&self) -> Result<Vec<String>, StoreError> {
        delegate!(self, s => s.list_index())
    }

    async fn set_index(&self, keys: &[String]) -> Result<(), StoreError> {
        delegate!(self, s => s.set_index(keys))
    }

    async fn publish(&self, event: &Event) -> Result<(), StoreError> {
        delegate!(self, s => s.publish(event))
    }

    async fn listen(&self) -> Result<EventStream, StoreError> {
        delegate!(self, s => s.listen())
    }

    fn lock_lease(&self) -> Duration {
        match self {
            Self::Memory(s) => s.lock_lease(),
            Self::Redis(s) => s.lock_lease(),
        }
    }

    async fn acquire_lock(&self) -> Result<Option<LockToken>, StoreError> {
        delegate!(self, s => s.acquire_lock())
    }

    async fn renew_lock(&self, token: &LockToken) -> Result<bool, StoreError> {
        delegate!(self, s => s.renew_lock(token))
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StoreError> {
        delegate!(self, s => s.release_lock(token))
    }

    async fn create_screen_token(&self) -> Result<String, StoreError> {
        delegate!(self, s => s.create_screen_token())
    }

    async fn redeem_screen_token(&self, token: &str, address: &str) -> Result<(), StoreError> {
        delegate!(self, s => s.redeem_screen_token(token, address))
    }
}
