//! Server-sent event stream of entity updates.
//!
//! Clients connect to `GET /events`, optionally passing
//! `?cluster_ids=a b` (whitespace-separated) to restrict the stream to
//! those entities. Each connection receives:
//!
//! 1. One `clusterupdate` frame per currently known entity (the snapshot).
//! 2. Every subsequent `clusterupdate` / `clusterdelta` event, live.
//!
//! The live subscription is taken *before* the snapshot is read, so an
//! event published in between is never lost. Such an event may also be
//! reflected in the snapshot already. That race is accepted, but a delta
//! is not idempotent: applying an `insert_at`, `remove_at`, or
//! `delete_key` twice corrupts the client's copy or fails outright. A
//! client that cannot apply a delta must reconnect and start over from a
//! fresh snapshot.
//!
//! The stream ends, prompting that reconnect, when:
//!
//! - a delta arrives for an entity the client holds no state for (not in
//!   its snapshot and no full event seen since), or
//! - the store drops its listeners after it may have missed events.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt as _};
use opsview_store::{Store, StoreError};
use opsview_types::{Entity, Event, PublishedEvent};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::state::AppState;

/// Query parameters for `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Whitespace-separated entity keys. Empty or absent means all.
    pub cluster_ids: Option<String>,
}

/// The set of entity keys a subscriber wants. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest(HashSet<String>);

impl Interest {
    /// Parse a whitespace-separated key list.
    pub fn parse(raw: Option<&str>) -> Self {
        Self(
            raw.unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Whether events for `key` should be forwarded.
    pub fn matches(&self, key: &str) -> bool {
        self.0.is_empty() || self.0.contains(key)
    }
}

/// Open an event stream.
///
/// # Route
///
/// `GET /events`
///
/// # Errors
///
/// Returns [`ServerError::Store`] if the subscription or the snapshot
/// read fails before the stream starts.
pub async fn events<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ServerError> {
    let interest = Interest::parse(query.cluster_ids.as_deref());

    let live = state.store.listen().await?;
    let snapshot = read_snapshot(&state.store, &interest).await?;
    debug!(entities = snapshot.len(), "Event stream subscriber connected");

    let mut known: HashSet<String> = snapshot.iter().map(|e| e.key().to_owned()).collect();
    let live = live
        .filter(move |event| std::future::ready(interest.matches(event.key())))
        .take_while(move |event| std::future::ready(track(&mut known, event)));
    let frames = stream::iter(snapshot)
        .map(|event| Arc::new(PublishedEvent::from(event)))
        .chain(live)
        .map(|event| Ok(to_frame(&event)));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

/// Full events for every indexed entity the subscriber is interested in,
/// in index order.
async fn read_snapshot<S: Store>(store: &S, interest: &Interest) -> Result<Vec<Event>, StoreError> {
    let keys = store.list_index().await?;
    let mut snapshot = Vec::with_capacity(keys.len());
    for key in keys.into_iter().filter(|key| interest.matches(key)) {
        match store.get(&key).await {
            Ok(Some(document)) => snapshot.push(Event::Full {
                entity: Entity::new(key, document),
            }),
            Ok(None) => {}
            Err(StoreError::Serialization(e)) => {
                warn!(%key, error = %e, "Skipping unreadable entity in snapshot");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(snapshot)
}

/// Record full events in `known`. Returns `false` for a delta the client
/// has no base state to apply to.
fn track(known: &mut HashSet<String>, event: &Event) -> bool {
    match event {
        Event::Full { entity } => {
            known.insert(entity.key.clone());
            true
        }
        Event::Delta { key, .. } if known.contains(key) => true,
        Event::Delta { key, .. } => {
            debug!(%key, "Delta for an entity the subscriber never saw, closing stream");
            false
        }
    }
}

fn to_frame(event: &PublishedEvent) -> SseEvent {
    SseEvent::default()
        .event(event.kind().stream_name())
        .data(event.stream_data())
}
