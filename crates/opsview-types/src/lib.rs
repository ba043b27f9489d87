//! Shared type definitions for the ops view state distribution service.
//!
//! This crate is the single source of truth for the types that flow between
//! the store backends, the update loop, and the event stream server.
//!
//! # Modules
//!
//! - [`document`] -- Tagged-variant entity documents
//! - [`patch`] -- Closed set of patch operations produced by the delta engine
//! - [`event`] -- Entities and the state-change events published for them
//! - [`token`] -- Lock holder tokens and screen access token records

pub mod document;
pub mod event;
pub mod patch;
pub mod token;

// Re-export all public types at crate root for convenience.
pub use document::Document;
pub use event::{Entity, Event, EventKind, PublishedEvent};
pub use patch::{Patch, PatchOp, PathSegment};
pub use token::{LockToken, ScreenTokenRecord, TokenPolicy};
