//! Behavioural tests for the in-process store backend.
//!
//! These exercise the full [`Store`] contract against [`MemoryStore`]:
//! latest-value storage, index replacement, lock exclusivity and lease
//! expiry, event delivery, and screen token redemption policies.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use futures::StreamExt as _;
use opsview_store::{MemoryStore, Store, StoreError, StoreSettings};
use opsview_types::{Document, Entity, Event, Patch, TokenPolicy};

fn store() -> MemoryStore {
    MemoryStore::new(StoreSettings::default())
}

fn store_with_policy(token_policy: TokenPolicy) -> MemoryStore {
    MemoryStore::new(StoreSettings {
        token_policy,
        ..StoreSettings::default()
    })
}

// =============================================================================
// Entities and index
// =============================================================================

#[tokio::test]
async fn get_returns_none_for_unknown_key() {
    assert_eq!(store().get("cluster-1").await.unwrap(), None);
}

#[tokio::test]
async fn set_overwrites_and_is_visible_immediately() {
    let store = store();
    let v1 = Document::map([("nodes", Document::from(3_i64))]);
    let v2 = Document::map([("nodes", Document::from(4_i64))]);

    store.set("cluster-1", &v1).await.unwrap();
    assert_eq!(store.get("cluster-1").await.unwrap(), Some(v1));

    store.set("cluster-1", &v2).await.unwrap();
    assert_eq!(store.get("cluster-1").await.unwrap(), Some(v2));
}

#[tokio::test]
async fn index_is_replaced_not_merged() {
    let store = store();
    assert!(store.list_index().await.unwrap().is_empty());

    store
        .set_index(&["a".to_owned(), "b".to_owned()])
        .await
        .unwrap();
    store.set_index(&["b".to_owned()]).await.unwrap();

    assert_eq!(store.list_index().await.unwrap(), vec!["b".to_owned()]);
}

// =============================================================================
// Coordination lock
// =============================================================================

#[tokio::test]
async fn lock_is_exclusive_under_concurrent_acquires() {
    let store = store();
    let attempts: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.acquire_lock().await.unwrap() })
        })
        .collect();

    let mut granted = 0;
    for attempt in attempts {
        if attempt.await.unwrap().is_some() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
async fn released_lock_can_be_reacquired() {
    let store = store();
    let token = store.acquire_lock().await.unwrap().unwrap();
    assert!(store.acquire_lock().await.unwrap().is_none());

    store.release_lock(&token).await.unwrap();
    assert!(store.acquire_lock().await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn expired_lease_is_reacquirable_and_stale_release_is_ignored() {
    let store = MemoryStore::new(StoreSettings {
        lock_lease: Duration::from_secs(10),
        ..StoreSettings::default()
    });

    let crashed = store.acquire_lock().await.unwrap().unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let successor = store.acquire_lock().await.unwrap().unwrap();
    assert!(!store.renew_lock(&crashed).await.unwrap());

    // The crashed holder's late release must not free the successor's lock.
    store.release_lock(&crashed).await.unwrap();
    assert!(store.acquire_lock().await.unwrap().is_none());
    assert!(store.renew_lock(&successor).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn renewal_extends_the_lease() {
    let store = MemoryStore::new(StoreSettings {
        lock_lease: Duration::from_secs(10),
        ..StoreSettings::default()
    });

    let token = store.acquire_lock().await.unwrap().unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(store.renew_lock(&token).await.unwrap());
    tokio::time::advance(Duration::from_secs(8)).await;

    assert!(store.acquire_lock().await.unwrap().is_none());
}

// =============================================================================
// Event channel
// =============================================================================

#[tokio::test]
async fn listeners_receive_events_in_publish_order() {
    let store = store();
    let mut events = store.listen().await.unwrap();

    let full = Event::Full {
        entity: Entity::new("cluster-1", Document::map([("nodes", Document::from(3_i64))])),
    };
    let delta = Event::Delta {
        key: "cluster-1".to_owned(),
        patch: Patch::new(),
    };
    store.publish(&full).await.unwrap();
    store.publish(&delta).await.unwrap();

    assert_eq!(events.next().await.map(|e| e.event().clone()), Some(full));
    assert_eq!(events.next().await.map(|e| e.event().clone()), Some(delta));
}

#[tokio::test]
async fn dropping_a_listener_releases_it() {
    let store = store();
    let events = store.listen().await.unwrap();
    drop(events);

    store
        .publish(&Event::Full {
            entity: Entity::new("cluster-1", Document::Null),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.listener_count(), 0);
}

// =============================================================================
// Screen tokens
// =============================================================================

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let err = store()
        .redeem_screen_token("nope", "10.0.0.1")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn single_use_token_redeems_once() {
    let store = store_with_policy(TokenPolicy::SingleUse);
    let token = store.create_screen_token().await.unwrap();

    store.redeem_screen_token(&token, "10.0.0.1").await.unwrap();
    let again = store.redeem_screen_token(&token, "10.0.0.1").await;
    assert!(matches!(again, Err(StoreError::Unauthorized(_))));
}

#[tokio::test]
async fn concurrent_single_use_redemptions_grant_exactly_one() {
    let store = store_with_policy(TokenPolicy::SingleUse);
    let token = store.create_screen_token().await.unwrap();

    let a = {
        let (store, token) = (store.clone(), token.clone());
        tokio::spawn(async move { store.redeem_screen_token(&token, "10.0.0.1").await })
    };
    let b = {
        let (store, token) = (store.clone(), token.clone());
        tokio::spawn(async move { store.redeem_screen_token(&token, "10.0.0.2").await })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
}

#[tokio::test]
async fn bind_once_token_is_reusable_from_the_same_address_only() {
    let store = store_with_policy(TokenPolicy::BindOnce);
    let token = store.create_screen_token().await.unwrap();

    store.redeem_screen_token(&token, "10.0.0.1").await.unwrap();
    store.redeem_screen_token(&token, "10.0.0.1").await.unwrap();
    assert!(
        store
            .redeem_screen_token(&token, "10.0.0.2")
            .await
            .unwrap_err()
            .is_unauthorized()
    );
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_unauthorized() {
    let store = MemoryStore::new(StoreSettings {
        token_ttl: Duration::from_secs(60),
        ..StoreSettings::default()
    });
    let token = store.create_screen_token().await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    assert!(
        store
            .redeem_screen_token(&token, "10.0.0.1")
            .await
            .unwrap_err()
            .is_unauthorized()
    );
}

#[tokio::test(start_paused = true)]
async fn issuing_a_token_drops_expired_ones() {
    let store = MemoryStore::new(StoreSettings {
        token_ttl: Duration::from_secs(60),
        ..StoreSettings::default()
    });
    for _ in 0..5 {
        store.create_screen_token().await.unwrap();
    }
    assert_eq!(store.screen_token_count().await, 5);

    tokio::time::advance(Duration::from_secs(61)).await;
    let fresh = store.create_screen_token().await.unwrap();

    assert_eq!(store.screen_token_count().await, 1);
    store.redeem_screen_token(&fresh, "10.0.0.1").await.unwrap();
}

#[tokio::test]
async fn lock_lease_reports_configured_lease() {
    let store = MemoryStore::new(StoreSettings {
        lock_lease: Duration::from_millis(750),
        ..StoreSettings::default()
    });
    assert_eq!(store.lock_lease(), Duration::from_millis(750));
}
