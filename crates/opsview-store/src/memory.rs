//! Single-process store backend.
//!
//! All state lives in process memory. The coordination lock is a lease
//! held in memory: with one updater per process it is always immediately
//! acquirable, and it still refuses a second concurrent holder. Events fan
//! out through a per-listener [`Fanout`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use opsview_types::{Document, Event, LockToken, ScreenTokenRecord};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fanout::Fanout;
use crate::settings::StoreSettings;
use crate::store::{EventStream, Store};
use crate::tokens::generate_screen_token;

/// A lease on the in-process lock.
struct Lease {
    token: LockToken,
    expires_at: Instant,
}

/// An issued screen token and its expiry.
struct IssuedToken {
    record: ScreenTokenRecord,
    expires_at: Instant,
}

struct Inner {
    entities: RwLock<HashMap<String, Document>>,
    index: RwLock<Vec<String>>,
    lease: Mutex<Option<Lease>>,
    tokens: Mutex<HashMap<String, IssuedToken>>,
    fanout: Fanout,
    settings: StoreSettings,
}

/// In-process store. Cloning shares the same state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store. Must be called inside a Tokio runtime.
    pub fn new(settings: StoreSettings) -> Self {
        info!(
            lock_lease_ms = settings.lock_lease.as_millis(),
            token_policy = ?settings.token_policy,
            "Using in-process store"
        );
        Self {
            inner: Arc::new(Inner {
                entities: RwLock::new(HashMap::new()),
                index: RwLock::new(Vec::new()),
                lease: Mutex::new(None),
                tokens: Mutex::new(HashMap::new()),
                fanout: Fanout::spawn(),
                settings,
            }),
        }
    }

    /// Number of live event listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.fanout.listener_count()
    }

    /// Number of screen tokens held in memory, expired or not.
    pub async fn screen_token_count(&self) -> usize {
        self.inner.tokens.lock().await.len()
    }
}

fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or(now)
}

impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.entities.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Document) -> Result<(), StoreError> {
        self.inner
            .entities
            .write()
            .await
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn list_index(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.index.read().await.clone())
    }

    async fn set_index(&self, keys: &[String]) -> Result<(), StoreError> {
        *self.inner.index.write().await = keys.to_vec();
        Ok(())
    }

    async fn publish(&self, event: &Event) -> Result<(), StoreError> {
        self.inner.fanout.publish(event.clone())
    }

    async fn listen(&self) -> Result<EventStream, StoreError> {
        self.inner.fanout.subscribe()
    }

    fn lock_lease(&self) -> Duration {
        self.inner.settings.lock_lease
    }

    async fn acquire_lock(&self) -> Result<Option<LockToken>, StoreError> {
        let mut lease = self.inner.lease.lock().await;
        let now = Instant::now();
        if lease.as_ref().is_some_and(|held| held.expires_at > now) {
            return Ok(None);
        }

        let token = LockToken::generate();
        *lease = Some(Lease {
            token: token.clone(),
            expires_at: deadline(self.inner.settings.lock_lease),
        });
        Ok(Some(token))
    }

    async fn renew_lock(&self, token: &LockToken) -> Result<bool, StoreError> {
        let mut lease = self.inner.lease.lock().await;
        match lease.as_mut() {
            Some(held) if held.token == *token && held.expires_at > Instant::now() => {
                held.expires_at = deadline(self.inner.settings.lock_lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StoreError> {
        let mut lease = self.inner.lease.lock().await;
        if lease.as_ref().is_some_and(|held| held.token == *token) {
            *lease = None;
        } else {
            debug!(%token, "Ignoring release of stale lock token");
        }
        Ok(())
    }

    async fn create_screen_token(&self) -> Result<String, StoreError> {
        let token = generate_screen_token();
        let issued = IssuedToken {
            record: ScreenTokenRecord::issued_now(),
            expires_at: deadline(self.inner.settings.token_ttl),
        };
        let mut tokens = self.inner.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, existing| existing.expires_at > now);
        tokens.insert(token.clone(), issued);
        Ok(token)
    }

    async fn redeem_screen_token(&self, token: &str, address: &str) -> Result<(), StoreError> {
        let mut tokens = self.inner.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, issued| issued.expires_at > now);

        let Some(issued) = tokens.get_mut(token) else {
            return Err(StoreError::Unauthorized("unknown screen token".to_owned()));
        };

        match issued.record.bound_to.as_deref() {
            None => {
                issued.record.bound_to = Some(address.to_owned());
                Ok(())
            }
            Some(bound) if self.inner.settings.token_policy.allows_rebind(bound, address) => Ok(()),
            Some(_) => Err(StoreError::Unauthorized(
                "screen token already redeemed".to_owned(),
            )),
        }
    }
}
