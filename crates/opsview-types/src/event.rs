//! Entities and the state-change events published for them.
//!
//! Every poll cycle produces exactly one [`Event`] per fetched entity:
//! a [`Event::Full`] the first time an entity is seen, and a
//! [`Event::Delta`] for every later sighting.

use std::ops::Deref;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::document::Document;
use crate::patch::Patch;

/// The latest known state of one tracked object (e.g. one cluster).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier of the entity.
    pub key: String,
    /// Full document describing the entity.
    pub document: Document,
}

impl Entity {
    /// Create an entity from its key and document.
    pub fn new(key: impl Into<String>, document: Document) -> Self {
        Self {
            key: key.into(),
            document,
        }
    }
}

/// Discriminates the two event kinds carried on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A complete snapshot of one entity.
    Full,
    /// A patch against the subscriber's last-known state of one entity.
    Delta,
}

impl EventKind {
    /// Event name used on the server-sent event stream.
    pub const fn stream_name(self) -> &'static str {
        match self {
            Self::Full => "clusterupdate",
            Self::Delta => "clusterdelta",
        }
    }
}

/// A state-change event.
///
/// The serde form (tagged by `"kind"`) is the transport encoding used on
/// the distributed event channel. Subscribers on the HTTP stream see the
/// projection returned by [`Event::stream_payload`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// First sighting of an entity, or a snapshot frame on connect.
    Full {
        /// The complete entity.
        entity: Entity,
    },
    /// Change to an already-known entity.
    Delta {
        /// Key of the changed entity.
        key: String,
        /// Edits transforming the previous state into the new one.
        patch: Patch,
    },
}

impl Event {
    /// Key of the entity this event refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::Full { entity } => &entity.key,
            Self::Delta { key, .. } => key,
        }
    }

    /// The event kind.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Full { .. } => EventKind::Full,
            Self::Delta { .. } => EventKind::Delta,
        }
    }

    /// JSON payload sent to stream subscribers.
    ///
    /// Full events carry the document itself; delta events carry
    /// `{"cluster_id": key, "delta": patch}`.
    pub fn stream_payload(&self) -> Value {
        match self {
            Self::Full { entity } => Value::from(entity.document.clone()),
            Self::Delta { key, patch } => json!({ "cluster_id": key, "delta": patch }),
        }
    }
}

/// An event as handed to listeners.
///
/// One instance is shared (behind an `Arc`) by every listener of a
/// publish, so the stream payload is rendered once however many
/// subscribers receive it.
#[derive(Debug)]
pub struct PublishedEvent {
    event: Event,
    data: OnceLock<String>,
}

impl PublishedEvent {
    /// Wrap `event` for delivery.
    pub const fn new(event: Event) -> Self {
        Self {
            event,
            data: OnceLock::new(),
        }
    }

    /// The wrapped event.
    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// [`Event::stream_payload`] serialized to JSON text, rendered on
    /// first use and cached.
    pub fn stream_data(&self) -> &str {
        self.data
            .get_or_init(|| self.event.stream_payload().to_string())
    }
}

impl Deref for PublishedEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl From<Event> for PublishedEvent {
    fn from(event: Event) -> Self {
        Self::new(event)
    }
}
