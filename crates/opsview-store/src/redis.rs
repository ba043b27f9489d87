//! Redis/Dragonfly store backend.
//!
//! State is shared by every instance of the service pointed at the same
//! Redis. Documents are stored as JSON strings. Events travel over one
//! pub/sub channel; each process keeps a single subscriber connection and
//! fans incoming events out to its local listeners.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `opsview:entity:{key}` | JSON | Latest document of one entity |
//! | `opsview:entity-index` | JSON | Ordered list of known entity keys |
//! | `opsview:events` | Channel | Serialized [`Event`]s |
//! | `opsview:update-lock` | String (PX lease) | Holder token of the update lock |
//! | `opsview:screen-token:{token}` | JSON (EX ttl) | Screen token metadata |
//! | `opsview:screen-token:{token}:bound` | String (EX ttl) | Address the token is bound to |

use std::time::Duration;

use fred::interfaces::LuaInterface as _;
use fred::prelude::*;
use opsview_types::{Document, Event, LockToken, ScreenTokenRecord};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::fanout::Fanout;
use crate::settings::StoreSettings;
use crate::store::{EventStream, Store};
use crate::tokens::generate_screen_token;

/// Prefix of per-entity document keys.
pub const ENTITY_PREFIX: &str = "opsview:entity:";

/// Key holding the serialized entity index.
pub const INDEX_KEY: &str = "opsview:entity-index";

/// Pub/sub channel carrying serialized events.
pub const EVENTS_CHANNEL: &str = "opsview:events";

/// Key holding the update lock lease.
pub const LOCK_KEY: &str = "opsview:update-lock";

/// Prefix of screen token keys.
pub const SCREEN_TOKEN_PREFIX: &str = "opsview:screen-token:";

/// Delete `KEYS[1]` only while it still holds `ARGV[1]`.
const RELEASE_LOCK_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Extend the lease on `KEYS[1]` to `ARGV[2]` ms only while it still holds `ARGV[1]`.
const RENEW_LOCK_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

/// Connection handle to a Redis-compatible server.
///
/// Wraps a command [`Client`] plus a dedicated subscriber connection whose
/// messages are forwarded into a local [`Fanout`].
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    fanout: Fanout,
    settings: StoreSettings,
}

impl RedisStore {
    /// Connect to Redis at the given URL and subscribe to the event channel.
    ///
    /// The URL follows the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Redis`] if either connection fails.
    pub async fn connect(url: &str, settings: StoreSettings) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Redis URL: {e}")))?;
        let policy = ReconnectPolicy::new_exponential(0, 100, 30_000, 2);

        let client = Builder::from_config(config.clone())
            .set_policy(policy.clone())
            .build()?;
        client.init().await?;

        let subscriber = Builder::from_config(config).set_policy(policy).build()?;
        subscriber.init().await?;

        let fanout = Fanout::spawn();
        subscriber.subscribe(EVENTS_CHANNEL).await?;
        tokio::spawn(forward_events(subscriber, fanout.clone()));

        info!(
            lock_lease_ms = settings.lock_lease.as_millis(),
            token_policy = ?settings.token_policy,
            "Connected to Redis"
        );
        Ok(Self {
            client,
            fanout,
            settings,
        })
    }

    /// Number of live local event listeners.
    pub fn listener_count(&self) -> usize {
        self.fanout.listener_count()
    }

    /// Flush all keys from the Redis instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

fn entity_key(key: &str) -> String {
    format!("{ENTITY_PREFIX}{key}")
}

fn screen_token_key(token: &str) -> String {
    format!("{SCREEN_TOKEN_PREFIX}{token}")
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Store for RedisStore {
    fn lock_lease(&self) -> Duration {
        self.settings.lock_lease
    }

    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        let value: Option<String> = self.client.get(entity_key(key)).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn set(&self, key: &str, value: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let _: () = self
            .client
            .set(entity_key(key), json.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    async fn list_index(&self) -> Result<Vec<String>, StoreError> {
        let value: Option<String> = self.client.get(INDEX_KEY).await?;
        value.map_or_else(|| Ok(Vec::new()), |s| Ok(serde_json::from_str(&s)?))
    }

    async fn set_index(&self, keys: &[String]) -> Result<(), StoreError> {
        let json = serde_json::to_string(keys)?;
        let _: () = self
            .client
            .set(INDEX_KEY, json.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    async fn publish(&self, event: &Event) -> Result<(), StoreError> {
        let json = serde_json::to_string(event)?;
        let receivers: i64 = self.client.publish(EVENTS_CHANNEL, json.as_str()).await?;
        debug!(key = event.key(), kind = ?event.kind(), receivers, "Published event");
        Ok(())
    }

    async fn listen(&self) -> Result<EventStream, StoreError> {
        self.fanout.subscribe()
    }

    async fn acquire_lock(&self) -> Result<Option<LockToken>, StoreError> {
        let token = LockToken::generate();
        let reply: Value = self
            .client
            .set(
                LOCK_KEY,
                token.as_str(),
                Some(Expiration::PX(millis(self.settings.lock_lease))),
                Some(SetOptions::NX),
                false,
            )
            .await?;
        Ok((!reply.is_null()).then_some(token))
    }

    async fn renew_lock(&self, token: &LockToken) -> Result<bool, StoreError> {
        let renewed: i64 = self
            .client
            .eval(
                RENEW_LOCK_SCRIPT,
                vec![LOCK_KEY],
                vec![
                    token.as_str().to_owned(),
                    millis(self.settings.lock_lease).to_string(),
                ],
            )
            .await?;
        Ok(renewed == 1)
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StoreError> {
        let released: i64 = self
            .client
            .eval(RELEASE_LOCK_SCRIPT, vec![LOCK_KEY], vec![token.as_str()])
            .await?;
        if released == 0 {
            debug!(%token, "Ignoring release of stale lock token");
        }
        Ok(())
    }

    async fn create_screen_token(&self) -> Result<String, StoreError> {
        let token = generate_screen_token();
        let json = serde_json::to_string(&ScreenTokenRecord::issued_now())?;
        let ttl = millis(self.settings.token_ttl);
        let _: () = self
            .client
            .set(
                screen_token_key(&token),
                json.as_str(),
                Some(Expiration::PX(ttl)),
                None,
                false,
            )
            .await?;
        Ok(token)
    }

    async fn redeem_screen_token(&self, token: &str, address: &str) -> Result<(), StoreError> {
        let record_key = screen_token_key(token);
        let raw: Option<String> = self.client.get(&record_key).await?;
        let Some(raw) = raw else {
            return Err(StoreError::Unauthorized("unknown screen token".to_owned()));
        };
        let record: ScreenTokenRecord = serde_json::from_str(&raw)?;

        // SET NX decides the race: exactly one concurrent redeemer binds.
        let bound_key = format!("{record_key}:bound");
        let bound: Value = self
            .client
            .set(
                &bound_key,
                address,
                Some(Expiration::PX(millis(self.settings.token_ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await?;
        if !bound.is_null() {
            debug!(created_at = %record.created_at, address, "Screen token bound");
            return Ok(());
        }

        let holder: Option<String> = self.client.get(&bound_key).await?;
        match holder {
            Some(holder) if self.settings.token_policy.allows_rebind(&holder, address) => Ok(()),
            _ => Err(StoreError::Unauthorized(
                "screen token already redeemed".to_owned(),
            )),
        }
    }
}

/// Forward pub/sub messages into the local fan-out until the subscriber
/// connection shuts down.
///
/// Re-subscribes after every reconnect. Whenever events may have been
/// missed (a reconnect or a lagging receiver) every local listener is
/// closed so its client reconnects and starts over from a snapshot.
async fn forward_events(subscriber: Client, fanout: Fanout) {
    let mut messages = subscriber.message_rx();
    let mut reconnects = subscriber.reconnect_rx();

    loop {
        tokio::select! {
            result = messages.recv() => {
                match result {
                    Ok(message) => {
                        let event = message
                            .value
                            .convert::<String>()
                            .map_err(StoreError::from)
                            .and_then(|s| serde_json::from_str::<Event>(&s).map_err(StoreError::from));
                        match event {
                            Ok(event) => {
                                if fanout.publish(event).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "Dropping undecodable event"),
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Event subscriber lagged, closing local listeners");
                        if fanout.reset().is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event subscriber closed");
                        return;
                    }
                }
            }
            result = reconnects.recv() => {
                match result {
                    Ok(server) => {
                        info!(?server, "Event subscriber reconnected, re-subscribing");
                        if let Err(e) = subscriber.subscribe(EVENTS_CHANNEL).await {
                            warn!(error = %e, "Failed to re-subscribe to event channel");
                        }
                        // Anything published while disconnected is gone.
                        if fanout.reset().is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
        }
    }
}
