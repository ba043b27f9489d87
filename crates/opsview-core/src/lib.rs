//! Delta computation, the update loop, and service configuration.
//!
//! # Modules
//!
//! - [`delta`] -- Structural diff and patch application over [`Document`](opsview_types::Document)s
//! - [`source`] -- The [`EntitySource`] seam the update loop polls
//! - [`mock`] -- Deterministic fake clusters
//! - [`updater`] -- Lock-protected poll, diff, publish, persist cycle
//! - [`config`] -- YAML configuration with environment overrides

pub mod config;
pub mod delta;
pub mod mock;
pub mod source;
pub mod updater;

pub use config::{ConfigError, LogFormat, ServiceConfig, StoreBackend};
pub use delta::{PatchError, apply, diff};
pub use mock::MockSource;
pub use source::{EntitySource, SourceError};
pub use updater::{CycleOutcome, Updater, UpdaterConfig};
