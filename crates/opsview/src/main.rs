//! Ops view service binary.
//!
//! Wires the store backend, the update loop, and the HTTP server together.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `opsview.yaml` (defaults if absent) plus
//!    environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Connect the configured store backend
//! 4. Spawn the update loop over the mock cluster source
//! 5. Serve HTTP until `SIGTERM` / `Ctrl-C`, then drain

mod error;

use std::path::Path;
use std::time::Duration;

use opsview_core::{LogFormat, MockSource, ServiceConfig, StoreBackend, Updater};
use opsview_server::{AppState, shutdown_signal, start_server};
use opsview_store::{AnyStore, MemoryStore, RedisStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "opsview.yaml";

/// How long health checks fail before the server stops, giving load
/// balancers time to take this instance out of rotation.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the store backend, or the HTTP
/// server fails to start.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config_path = Path::new(CONFIG_PATH);
    let config = ServiceConfig::load(config_path)?;

    // 2. Initialize structured logging.
    init_tracing(config.logging.format);
    info!(
        config_file = config_path.exists(),
        backend = ?config.store.backend,
        poll_interval_ms = config.update.poll_interval_ms,
        lock_lease_ms = config.update.lock_lease_ms,
        token_policy = ?config.tokens.policy,
        "opsview starting"
    );

    // 3. Connect the store.
    let settings = config.store_settings();
    let store: AnyStore = match config.store.backend {
        StoreBackend::Memory => MemoryStore::new(settings).into(),
        StoreBackend::Redis => RedisStore::connect(&config.store.redis_url, settings)
            .await?
            .into(),
    };
    info!(backend = store.name(), "Store ready");

    // 4. Spawn the update loop.
    let updater = Updater::new(
        store.clone(),
        MockSource::new(config.mock.clusters, config.mock.seed),
        config.updater_config(),
    );
    tokio::spawn(async move { updater.run().await });
    info!(clusters = config.mock.clusters, seed = config.mock.seed, "Update loop spawned");

    // 5. Serve until asked to stop.
    let state = AppState::new(store);
    let draining = state.clone();
    let shutdown = async move {
        shutdown_signal().await;
        draining.begin_shutdown();
        info!(drain_secs = SHUTDOWN_DRAIN.as_secs(), "Draining before shutdown");
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
    };
    start_server(&config.server.bind_address(), state, shutdown).await?;

    info!("opsview stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
