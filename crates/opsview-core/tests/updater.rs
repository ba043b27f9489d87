//! Update loop tests against the in-process store.
//!
//! A scripted source hands out a fixed sequence of poll results so each
//! test controls exactly what the updater sees, cycle by cycle. A faulty
//! store wrapper injects lost leases and undecodable stored state.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects
)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt as _;
use opsview_core::{
    CycleOutcome, EntitySource, SourceError, Updater, UpdaterConfig, apply,
};
use opsview_store::{EventStream, MemoryStore, Store, StoreError, StoreSettings};
use opsview_types::{Document, Entity, Event, LockToken, PatchOp, PathSegment};

/// Replays queued poll results, optionally taking time for each poll.
struct ScriptedSource {
    polls: Mutex<VecDeque<Result<Vec<Entity>, SourceError>>>,
    latency: Duration,
}

impl ScriptedSource {
    fn new(polls: Vec<Result<Vec<Entity>, SourceError>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            latency: Duration::ZERO,
        }
    }

    fn slow(polls: Vec<Result<Vec<Entity>, SourceError>>, latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new(polls)
        }
    }
}

impl EntitySource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<Entity>, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(SourceError::Unavailable {
                    message: "script exhausted".to_owned(),
                })
            })
    }
}

fn cluster(key: &str, nodes: i64) -> Entity {
    Entity::new(
        key,
        Document::map([
            ("id", Document::from(key)),
            ("nodes", Document::from(nodes)),
        ]),
    )
}

/// In-process store that can be told to report a lost lease or to fail
/// decoding chosen keys.
#[derive(Clone)]
struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    /// Renewals that succeed before the lease is reported lost. `None`
    /// never loses it.
    renewals_left: Mutex<Option<usize>>,
    unreadable: Mutex<HashSet<String>>,
}

impl FaultyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    fn lose_lease_after(self, renewals: usize) -> Self {
        *self.faults.renewals_left.lock().unwrap() = Some(renewals);
        self
    }

    fn unreadable(self, key: &str) -> Self {
        self.faults.unreadable.lock().unwrap().insert(key.to_owned());
        self
    }
}

impl Store for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        let unreadable = self.faults.unreadable.lock().unwrap().contains(key);
        if unreadable {
            let error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            return Err(StoreError::Serialization(error));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Document) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn list_index(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_index().await
    }

    async fn set_index(&self, keys: &[String]) -> Result<(), StoreError> {
        self.inner.set_index(keys).await
    }

    async fn publish(&self, event: &Event) -> Result<(), StoreError> {
        self.inner.publish(event).await
    }

    async fn listen(&self) -> Result<EventStream, StoreError> {
        self.inner.listen().await
    }

    fn lock_lease(&self) -> Duration {
        self.inner.lock_lease()
    }

    async fn acquire_lock(&self) -> Result<Option<LockToken>, StoreError> {
        self.inner.acquire_lock().await
    }

    async fn renew_lock(&self, token: &LockToken) -> Result<bool, StoreError> {
        let lost = {
            let mut left = self.faults.renewals_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => true,
                Some(n) => {
                    *n -= 1;
                    false
                }
                None => false,
            }
        };
        if lost {
            return Ok(false);
        }
        self.inner.renew_lock(token).await
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StoreError> {
        self.inner.release_lock(token).await
    }

    async fn create_screen_token(&self) -> Result<String, StoreError> {
        self.inner.create_screen_token().await
    }

    async fn redeem_screen_token(&self, token: &str, address: &str) -> Result<(), StoreError> {
        self.inner.redeem_screen_token(token, address).await
    }
}

fn updater<S: Store>(
    store: &S,
    polls: Vec<Result<Vec<Entity>, SourceError>>,
) -> Updater<S, ScriptedSource> {
    Updater::new(
        store.clone(),
        ScriptedSource::new(polls),
        UpdaterConfig::default(),
    )
}

async fn next_event(events: &mut EventStream) -> Event {
    tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("event not delivered in time")
        .expect("event stream ended")
        .event()
        .clone()
}

async fn assert_no_event(events: &mut EventStream) {
    let next = tokio::time::timeout(Duration::from_millis(50), events.next()).await;
    assert!(next.is_err(), "unexpected event published");
}

#[tokio::test]
async fn first_sighting_is_full_then_delta() {
    let store = MemoryStore::new(StoreSettings::default());
    let mut events = store.listen().await.unwrap();
    let updater = updater(
        &store,
        vec![Ok(vec![cluster("c1", 3)]), Ok(vec![cluster("c1", 4)])],
    );

    assert_eq!(
        updater.run_once().await,
        CycleOutcome::Completed { full: 1, delta: 0 }
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Full {
            entity: cluster("c1", 3)
        }
    );

    assert_eq!(
        updater.run_once().await,
        CycleOutcome::Completed { full: 0, delta: 1 }
    );
    let Event::Delta { key, patch } = next_event(&mut events).await else {
        panic!("expected a delta event");
    };
    assert_eq!(key, "c1");
    assert_eq!(
        patch.ops(),
        [PatchOp::Replace {
            path: vec![PathSegment::from("nodes")],
            value: Document::from(4_i64),
        }]
    );

    assert_eq!(store.get("c1").await.unwrap(), Some(cluster("c1", 4).document));
}

#[tokio::test]
async fn delta_applied_to_prior_state_reproduces_new_state() {
    let store = MemoryStore::new(StoreSettings::default());
    let before = Entity::new(
        "c1",
        Document::map([
            ("id", Document::from("c1")),
            (
                "pods",
                Document::from(vec![Document::from("a"), Document::from("b")]),
            ),
        ]),
    );
    let after = Entity::new(
        "c1",
        Document::map([
            ("id", Document::from("c1")),
            ("pods", Document::from(vec![Document::from("a")])),
            ("ready", Document::from(true)),
        ]),
    );
    let updater = updater(&store, vec![Ok(vec![before.clone()]), Ok(vec![after.clone()])]);
    updater.run_once().await;

    let mut events = store.listen().await.unwrap();
    updater.run_once().await;
    let Event::Delta { patch, .. } = next_event(&mut events).await else {
        panic!("expected a delta event");
    };

    let mut doc = before.document;
    apply(&mut doc, &patch).unwrap();
    assert_eq!(doc, after.document);
}

#[tokio::test]
async fn unchanged_entity_publishes_empty_delta() {
    let store = MemoryStore::new(StoreSettings::default());
    let updater = updater(
        &store,
        vec![Ok(vec![cluster("c1", 3)]), Ok(vec![cluster("c1", 3)])],
    );
    updater.run_once().await;

    let mut events = store.listen().await.unwrap();
    updater.run_once().await;
    let Event::Delta { patch, .. } = next_event(&mut events).await else {
        panic!("expected a delta event");
    };
    assert!(patch.is_empty());
}

#[tokio::test]
async fn poll_failure_commits_nothing_and_releases_the_lock() {
    let store = MemoryStore::new(StoreSettings::default());
    let updater = updater(
        &store,
        vec![Err(SourceError::Unavailable {
            message: "connection refused".to_owned(),
        })],
    );

    assert_eq!(updater.run_once().await, CycleOutcome::PollFailed);
    assert!(store.list_index().await.unwrap().is_empty());
    assert!(store.acquire_lock().await.unwrap().is_some());
}

#[tokio::test]
async fn held_lock_skips_the_cycle() {
    let store = MemoryStore::new(StoreSettings::default());
    let _held = store.acquire_lock().await.unwrap().unwrap();
    let updater = updater(&store, vec![Ok(vec![cluster("c1", 3)])]);

    assert_eq!(updater.run_once().await, CycleOutcome::LockHeld);
    assert_eq!(store.get("c1").await.unwrap(), None);
}

#[tokio::test]
async fn index_is_rebuilt_to_reflect_removals() {
    let store = MemoryStore::new(StoreSettings::default());
    let updater = updater(
        &store,
        vec![
            Ok(vec![cluster("c1", 3), cluster("c2", 1)]),
            Ok(vec![cluster("c2", 1)]),
        ],
    );

    updater.run_once().await;
    assert_eq!(store.list_index().await.unwrap(), ["c1", "c2"]);

    updater.run_once().await;
    assert_eq!(store.list_index().await.unwrap(), ["c2"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_updaters_run_exactly_one_cycle() {
    let store = MemoryStore::new(StoreSettings::default());
    let latency = Duration::from_millis(50);
    let a = Updater::new(
        store.clone(),
        ScriptedSource::slow(vec![Ok(vec![cluster("c1", 3)])], latency),
        UpdaterConfig::default(),
    );
    let b = Updater::new(
        store.clone(),
        ScriptedSource::slow(vec![Ok(vec![cluster("c1", 3)])], latency),
        UpdaterConfig::default(),
    );

    let (x, y) = tokio::join!(a.run_once(), b.run_once());
    let completed = [x, y]
        .iter()
        .filter(|o| matches!(o, CycleOutcome::Completed { .. }))
        .count();
    assert_eq!(completed, 1);
    assert!([x, y].contains(&CycleOutcome::LockHeld));
}

#[tokio::test(start_paused = true)]
async fn lease_is_renewed_during_a_long_cycle() {
    let lease = Duration::from_millis(300);
    let store = MemoryStore::new(StoreSettings {
        lock_lease: lease,
        ..StoreSettings::default()
    });
    let updater = Updater::new(
        store.clone(),
        ScriptedSource::slow(vec![Ok(vec![cluster("c1", 3)])], Duration::from_secs(1)),
        UpdaterConfig {
            poll_interval: Duration::from_millis(100),
        },
    );

    let cycle = tokio::spawn(async move { updater.run_once().await });
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(store.acquire_lock().await.unwrap().is_none());

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Completed { full: 1, delta: 0 }
    );
    assert!(store.acquire_lock().await.unwrap().is_some());
}

#[tokio::test]
async fn repeated_key_in_one_poll_publishes_one_delta() {
    let store = MemoryStore::new(StoreSettings::default());
    let pods = |items: &[i64]| {
        Entity::new(
            "c1",
            Document::map([(
                "pods",
                Document::from(items.iter().copied().map(Document::from).collect::<Vec<_>>()),
            )]),
        )
    };
    let updater = updater(
        &store,
        vec![
            Ok(vec![pods(&[1])]),
            Ok(vec![pods(&[1, 2]), pods(&[1, 3])]),
        ],
    );
    updater.run_once().await;
    let mut client_view = store.get("c1").await.unwrap().unwrap();

    let mut events = store.listen().await.unwrap();
    assert_eq!(
        updater.run_once().await,
        CycleOutcome::Completed { full: 0, delta: 1 }
    );
    let Event::Delta { patch, .. } = next_event(&mut events).await else {
        panic!("expected a delta event");
    };
    assert_no_event(&mut events).await;

    apply(&mut client_view, &patch).unwrap();
    assert_eq!(client_view, pods(&[1, 3]).document);
    assert_eq!(store.get("c1").await.unwrap(), Some(client_view));
    assert_eq!(store.list_index().await.unwrap(), ["c1"]);
}

#[tokio::test]
async fn unreadable_prior_state_publishes_full_event() {
    let inner = MemoryStore::new(StoreSettings::default());
    inner.set("c1", &cluster("c1", 3).document).await.unwrap();
    let store = FaultyStore::new(inner.clone()).unreadable("c1");
    let mut events = store.listen().await.unwrap();

    assert_eq!(
        updater(&store, vec![Ok(vec![cluster("c1", 4)])]).run_once().await,
        CycleOutcome::Completed { full: 1, delta: 0 }
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Full {
            entity: cluster("c1", 4)
        }
    );
    assert_eq!(inner.get("c1").await.unwrap(), Some(cluster("c1", 4).document));
}

#[tokio::test]
async fn lease_lost_before_publishing_commits_nothing() {
    let inner = MemoryStore::new(StoreSettings::default());
    let store = FaultyStore::new(inner.clone()).lose_lease_after(0);
    let mut events = store.listen().await.unwrap();

    assert_eq!(
        updater(&store, vec![Ok(vec![cluster("c1", 3)])]).run_once().await,
        CycleOutcome::LeaseLost
    );
    assert_no_event(&mut events).await;
    assert_eq!(inner.get("c1").await.unwrap(), None);
    assert!(inner.list_index().await.unwrap().is_empty());
}

#[tokio::test]
async fn lease_lost_before_persisting_leaves_store_untouched() {
    let inner = MemoryStore::new(StoreSettings::default());
    inner.set("c1", &cluster("c1", 3).document).await.unwrap();
    inner.set_index(&["c1".to_owned()]).await.unwrap();
    let store = FaultyStore::new(inner.clone()).lose_lease_after(1);

    assert_eq!(
        updater(&store, vec![Ok(vec![cluster("c1", 4), cluster("c2", 1)])])
            .run_once()
            .await,
        CycleOutcome::LeaseLost
    );
    assert_eq!(inner.get("c1").await.unwrap(), Some(cluster("c1", 3).document));
    assert_eq!(inner.get("c2").await.unwrap(), None);
    assert_eq!(inner.list_index().await.unwrap(), ["c1"]);
}

#[tokio::test(start_paused = true)]
async fn lease_lost_mid_poll_abandons_the_cycle() {
    let inner = MemoryStore::new(StoreSettings {
        lock_lease: Duration::from_millis(300),
        ..StoreSettings::default()
    });
    let store = FaultyStore::new(inner.clone()).lose_lease_after(0);
    let updater = Updater::new(
        store,
        ScriptedSource::slow(vec![Ok(vec![cluster("c1", 3)])], Duration::from_secs(1)),
        UpdaterConfig::default(),
    );

    let started = tokio::time::Instant::now();
    assert_eq!(updater.run_once().await, CycleOutcome::LeaseLost);
    // The first background renewal, a third of the lease in, gives up.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(inner.get("c1").await.unwrap(), None);
}
