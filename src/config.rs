//! Configuration management for Redline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RedlineError, Result};

/// Main configuration for a set of Redline primitives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedlineConfig {
    /// Store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Sliding-window rate limiter
    #[serde(default)]
    pub rate_limiting: RateLimiterConfig,

    /// Distributed mutex
    #[serde(default)]
    pub mutex: MutexConfig,

    /// FIFO queue
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Connection settings for the Redis store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis host
    #[serde(default = "default_host")]
    pub host: String,

    /// Redis port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// Time allowed to establish a connection, in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Time allowed for a single command or script reply, in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            connection_timeout_ms: default_connection_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Connection URL understood by the `redis` crate.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    /// The connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// The per-command response timeout.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_connection_timeout_ms() -> u64 {
    1000
}

fn default_response_timeout_ms() -> u64 {
    1000
}

/// What the rate limiter answers when the store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Deny the request
    #[default]
    Closed,
    /// Admit the request
    Open,
}

/// Sliding-window rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Name of the window; subjects are appended as `{name}:{subject}`
    #[serde(default = "default_limiter_name")]
    pub name: String,

    /// Length of the trailing window in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Answer used by `admit` when the store is unavailable
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            name: default_limiter_name(),
            period_ms: default_period_ms(),
            max_requests: default_max_requests(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RateLimiterConfig {
    /// Create a configuration with the given window.
    pub fn new(name: impl Into<String>, period: Duration, max_requests: u64) -> Self {
        Self {
            name: name.into(),
            period_ms: period.as_millis() as u64,
            max_requests,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// The window length.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Reject windows that could never admit anything.
    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            return Err(RedlineError::Config(
                "rate limiter period must be positive".to_string(),
            ));
        }
        if self.period_ms > MAX_PERIOD_MS {
            return Err(RedlineError::Config(format!(
                "rate limiter period must be at most {}ms",
                MAX_PERIOD_MS
            )));
        }
        if self.max_requests == 0 {
            return Err(RedlineError::Config(
                "rate limiter max_requests must be positive".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(RedlineError::Config(
                "rate limiter name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Longest window whose length in microseconds still fits the store's
/// signed 64-bit arithmetic.
const MAX_PERIOD_MS: u64 = i64::MAX as u64 / 1000;

fn default_limiter_name() -> String {
    "rate_limiter".to_string()
}

fn default_period_ms() -> u64 {
    3000
}

fn default_max_requests() -> u64 {
    5
}

/// Distributed mutex configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexConfig {
    /// Prefix for lock keys, stored as `{key_prefix}:{lock_key}`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Margin added to a maximum processing time to derive a TTL
    #[serde(default = "default_ttl_margin_ms")]
    pub ttl_margin_ms: u64,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ttl_margin_ms: default_ttl_margin_ms(),
        }
    }
}

impl MutexConfig {
    /// The TTL margin.
    pub fn ttl_margin(&self) -> Duration {
        Duration::from_millis(self.ttl_margin_ms)
    }
}

fn default_key_prefix() -> String {
    "lock".to_string()
}

fn default_ttl_margin_ms() -> u64 {
    3000
}

/// FIFO queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name of the backing list
    #[serde(default = "default_queue_name")]
    pub name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
        }
    }
}

fn default_queue_name() -> String {
    "queue".to_string()
}

impl RedlineConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RedlineError::Config(e.to_string()))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file, overridden by `REDLINE_*`
    /// environment variables (`REDLINE_STORE__PORT=6380`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("REDLINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
