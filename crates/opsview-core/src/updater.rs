//! The update loop.
//!
//! One [`Updater`] runs per process, but the coordination lock ensures only
//! one of them performs a cycle at any moment across the whole deployment.
//! A cycle is:
//!
//! 1. Try to take the lock; if another holder has it, do nothing.
//! 2. Poll the [`EntitySource`] and keep the last entity seen per key.
//! 3. For each entity, publish a delta against its stored value, or a
//!    full event when there is no (readable) stored value.
//! 4. Persist every entity and the rebuilt index.
//! 5. Release the lock.
//!
//! While steps 2-4 run, the lease is renewed every third of its duration.
//! The lease is also confirmed right before publishing and right before
//! persisting. As soon as it turns out to be lost the cycle is abandoned,
//! since another instance may already be running its own.

use std::collections::HashMap;
use std::time::Duration;

use opsview_store::{Store, StoreError};
use opsview_types::{Entity, Event, LockToken};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::delta::diff;
use crate::source::EntitySource;

/// Default delay between cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timing parameters of the update loop.
///
/// The lock lease is not part of it: renewals are paced from
/// [`Store::lock_lease`], the lease the store actually grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another instance holds the lock. Nothing was done.
    LockHeld,
    /// The cycle published and persisted every polled entity.
    Completed {
        /// Number of full events published.
        full: usize,
        /// Number of delta events published.
        delta: usize,
    },
    /// The source poll failed. Nothing was committed.
    PollFailed,
    /// The lock was lost part way through. The cycle stopped at that
    /// point; events already published stay published.
    LeaseLost,
    /// A store operation failed part way through the cycle.
    StoreFailed,
}

/// Drives poll, diff, publish, and persist cycles against a store.
#[derive(Debug)]
pub struct Updater<S, P> {
    store: S,
    source: P,
    config: UpdaterConfig,
}

impl<S: Store, P: EntitySource> Updater<S, P> {
    /// Create an updater writing to `store` from `source`.
    pub const fn new(store: S, source: P, config: UpdaterConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Run cycles forever, sleeping `poll_interval` between them.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            lock_lease_ms = self.store.lock_lease().as_millis(),
            "Update loop starting"
        );
        loop {
            match self.run_once().await {
                CycleOutcome::Completed { full, delta } => {
                    info!(full, delta, "Update cycle completed");
                }
                CycleOutcome::LockHeld => debug!("Update lock held elsewhere, skipping cycle"),
                CycleOutcome::PollFailed
                | CycleOutcome::StoreFailed
                | CycleOutcome::LeaseLost => {}
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run a single cycle. The lock is always released before returning.
    pub async fn run_once(&self) -> CycleOutcome {
        let token = match self.store.acquire_lock().await {
            Ok(Some(token)) => token,
            Ok(None) => return CycleOutcome::LockHeld,
            Err(e) => {
                warn!(error = %e, "Failed to acquire update lock");
                return CycleOutcome::StoreFailed;
            }
        };

        let outcome = self.renewing(&token).await;

        if let Err(e) = self.store.release_lock(&token).await {
            warn!(error = %e, %token, "Failed to release update lock");
        }
        outcome
    }

    /// Run the protected section while renewing the lease in the background.
    async fn renewing(&self, token: &LockToken) -> CycleOutcome {
        let period = self
            .store
            .lock_lease()
            .checked_div(3)
            .unwrap_or_default()
            .max(Duration::from_millis(1));
        let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
        let mut renewals = tokio::time::interval_at(start, period);
        renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cycle = self.cycle(token);
        tokio::pin!(cycle);

        loop {
            tokio::select! {
                outcome = &mut cycle => return outcome,
                _ = renewals.tick() => match self.store.renew_lock(token).await {
                    Ok(true) => debug!(%token, "Renewed update lock"),
                    Ok(false) => {
                        warn!(%token, "Update lock lease lost mid-cycle, abandoning cycle");
                        return CycleOutcome::LeaseLost;
                    }
                    Err(e) => warn!(error = %e, "Failed to renew update lock"),
                },
            }
        }
    }

    async fn cycle(&self, token: &LockToken) -> CycleOutcome {
        let entities = match self.source.fetch().await {
            Ok(entities) => latest_per_key(entities),
            Err(e) => {
                warn!(error = %e, "Failed to poll entity source");
                return CycleOutcome::PollFailed;
            }
        };

        match self.publish_and_persist(token, entities).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Store failure during update cycle");
                CycleOutcome::StoreFailed
            }
        }
    }

    async fn publish_and_persist(
        &self,
        token: &LockToken,
        entities: Vec<Entity>,
    ) -> Result<CycleOutcome, StoreError> {
        if !self.still_holds(token).await? {
            return Ok(CycleOutcome::LeaseLost);
        }

        let mut full: usize = 0;
        let mut delta: usize = 0;

        for entity in &entities {
            let event = match self.store.get(&entity.key).await {
                Ok(Some(prior)) => {
                    delta = delta.saturating_add(1);
                    Event::Delta {
                        key: entity.key.clone(),
                        patch: diff(&prior, &entity.document),
                    }
                }
                Ok(None) => {
                    full = full.saturating_add(1);
                    Event::Full {
                        entity: entity.clone(),
                    }
                }
                Err(StoreError::Serialization(e)) => {
                    warn!(key = %entity.key, error = %e, "Stored state unreadable, sending full event");
                    full = full.saturating_add(1);
                    Event::Full {
                        entity: entity.clone(),
                    }
                }
                Err(e) => return Err(e),
            };
            self.store.publish(&event).await?;
        }

        if !self.still_holds(token).await? {
            return Ok(CycleOutcome::LeaseLost);
        }

        let mut index = Vec::with_capacity(entities.len());
        for entity in entities {
            self.store.set(&entity.key, &entity.document).await?;
            index.push(entity.key);
        }
        self.store.set_index(&index).await?;

        Ok(CycleOutcome::Completed { full, delta })
    }

    /// Renew the lease, reporting whether `token` still holds the lock.
    async fn still_holds(&self, token: &LockToken) -> Result<bool, StoreError> {
        let held = self.store.renew_lock(token).await?;
        if !held {
            warn!(%token, "Update lock lease lost, abandoning cycle");
        }
        Ok(held)
    }
}

/// Collapse repeated keys so each entity is diffed and published once.
///
/// The last document polled for a key wins; it takes the position of the
/// key's first occurrence.
fn latest_per_key(entities: Vec<Entity>) -> Vec<Entity> {
    let polled = entities.len();
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(polled);
    let mut unique: Vec<Entity> = Vec::with_capacity(polled);

    for entity in entities {
        if let Some(slot) = positions.get(&entity.key).and_then(|&i| unique.get_mut(i)) {
            *slot = entity;
        } else {
            positions.insert(entity.key.clone(), unique.len());
            unique.push(entity);
        }
    }

    if unique.len() < polled {
        warn!(
            polled,
            unique = unique.len(),
            "Source returned repeated keys, keeping the last document of each"
        );
    }
    unique
}
