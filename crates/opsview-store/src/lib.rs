//! State storage, coordination, and event distribution for the ops view.
//!
//! Every backend implements [`Store`]: latest-value storage for entity
//! documents, the ordered entity index, a lease-based coordination lock,
//! a publish/subscribe event channel, and the screen token registry.
//!
//! # Architecture
//!
//! ```text
//! Update Loop --set/publish--> Store --listen--> Fanout --queue per listener--> Stream Server
//!                                |
//!                                +-- MemoryStore  (one process)
//!                                +-- RedisStore   (many processes, shared Redis/Dragonfly)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`Store`] trait and [`EventStream`] type
//! - [`memory`] -- In-process backend
//! - [`redis`] -- Redis/Dragonfly backend
//! - [`backend`] -- [`AnyStore`] runtime backend selection
//! - [`fanout`] -- Per-listener buffered event dispatcher
//! - [`settings`] -- Lock lease and token policy settings
//! - [`tokens`] -- Screen token generation
//! - [`error`] -- Shared error types

pub mod backend;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod redis;
pub mod settings;
pub mod store;
pub mod tokens;

// Re-export primary types for convenience.
pub use backend::AnyStore;
pub use error::StoreError;
pub use fanout::Fanout;
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use settings::StoreSettings;
pub use store::{EventStream, Store};
