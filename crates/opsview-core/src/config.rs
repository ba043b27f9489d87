//! Configuration loading and typed config structures for the ops view service.
//!
//! Configuration lives in an optional `opsview.yaml`. Every field has a
//! default, so an empty or missing file yields a working in-memory setup
//! with mock clusters. A handful of environment variables override the
//! file for container deployments:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `REDIS_URL` | `store.redis_url`, and selects the `redis` backend |
//! | `SERVER_PORT` | `server.port` |
//! | `POLL_INTERVAL_MS` | `update.poll_interval_ms` |
//! | `SCREEN_TOKEN_POLICY` | `tokens.policy` |
//! | `MOCK_CLUSTERS` | `mock.clusters` |
//! | `LOG_FORMAT` | `logging.format` |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use opsview_store::StoreSettings;
use opsview_types::TokenPolicy;
use serde::Deserialize;

use crate::updater::UpdaterConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or an override could not be parsed.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Top-level service configuration. Mirrors the structure of `opsview.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Update loop timing.
    #[serde(default)]
    pub update: UpdateConfig,

    /// Store backend selection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Screen token registry.
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Mock cluster source.
    #[serde(default)]
    pub mock: MockConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Environment overrides are applied either way.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if the result is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value or override is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. Environment overrides are
    /// not applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL").filter(|url| !url.is_empty()) {
            self.store.backend = StoreBackend::Redis;
            self.store.redis_url = url;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", &port)?;
        }
        if let Some(ms) = lookup("POLL_INTERVAL_MS") {
            self.update.poll_interval_ms = parse_var("POLL_INTERVAL_MS", &ms)?;
        }
        if let Some(policy) = lookup("SCREEN_TOKEN_POLICY") {
            self.tokens.policy = TokenPolicy::from_str(&policy).map_err(invalid)?;
        }
        if let Some(clusters) = lookup("MOCK_CLUSTERS") {
            self.mock.clusters = parse_var("MOCK_CLUSTERS", &clusters)?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&format).map_err(invalid)?;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update.poll_interval_ms == 0 {
            return Err(invalid("update.poll_interval_ms must be positive"));
        }
        if self.update.lock_lease_ms <= self.update.poll_interval_ms {
            return Err(invalid(format!(
                "update.lock_lease_ms ({}) must exceed update.poll_interval_ms ({})",
                self.update.lock_lease_ms, self.update.poll_interval_ms
            )));
        }
        if self.tokens.ttl_secs == 0 {
            return Err(invalid("tokens.ttl_secs must be positive"));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_empty() {
            return Err(invalid("store.redis_url is required for the redis backend"));
        }
        Ok(())
    }

    /// Store settings derived from this configuration.
    pub const fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            lock_lease: Duration::from_millis(self.update.lock_lease_ms),
            token_policy: self.tokens.policy,
            token_ttl: Duration::from_secs(self.tokens.ttl_secs),
        }
    }

    /// Update loop timing derived from this configuration.
    ///
    /// The lock lease only reaches the updater through the store, see
    /// [`store_settings`](Self::store_settings).
    pub const fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            poll_interval: Duration::from_millis(self.update.poll_interval_ms),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(format!("{name}: cannot parse {value:?}")))
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// The `host:port` string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Update loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateConfig {
    /// Milliseconds between update cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lease of the coordination lock in milliseconds. Must exceed one
    /// poll interval; a crashed holder blocks updates for at most this long.
    #[serde(default = "default_lock_lease_ms")]
    pub lock_lease_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lock_lease_ms: default_lock_lease_ms(),
        }
    }
}

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process state. Single instance only.
    #[default]
    Memory,
    /// Shared Redis/Dragonfly state.
    Redis,
}

/// Store backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL, used by the `redis` backend.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

/// Screen token registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenConfig {
    /// Redemption policy.
    #[serde(default)]
    pub policy: TokenPolicy,

    /// Seconds an issued token stays redeemable.
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            policy: TokenPolicy::default(),
            ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Mock cluster source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MockConfig {
    /// Number of fake clusters.
    #[serde(default = "default_mock_clusters")]
    pub clusters: u64,

    /// Seed for the generated layout.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            clusters: default_mock_clusters(),
            seed: default_seed(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_poll_interval_ms() -> u64 {
    5000
}

const fn default_lock_lease_ms() -> u64 {
    30_000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_token_ttl_secs() -> u64 {
    3600
}

const fn default_mock_clusters() -> u64 {
    3
}

const fn default_seed() -> u64 {
    42
}
