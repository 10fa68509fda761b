//! Layered configuration for the hookrelay service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use hookrelay_delivery::{
    client::ClientConfig,
    config::{IN_MEMORY_QUEUE, SEQUENTIAL_RUNNER},
    PoolConfig, QueueConfig, RetryPolicy, RunnerConfig,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "hookrelay.toml";
const ENV_PREFIX: &str = "HOOKRELAY_";

/// Complete service configuration.
///
/// Loaded in priority order, highest first:
/// 1. Environment variables prefixed with `HOOKRELAY_`, with `__` separating
///    nested keys (`HOOKRELAY_QUEUE__KIND=redis`)
/// 2. `hookrelay.toml` in the working directory
/// 3. Built-in defaults
///
/// Every value has a default, so the service starts with an in-memory queue
/// when nothing is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Queue backend.
    #[serde(default)]
    pub queue: QueueSection,
    /// Dispatch runner.
    #[serde(default)]
    pub runner: RunnerSection,
    /// Publisher retry and HTTP client settings.
    #[serde(default)]
    pub publisher: PublisherSection,
    /// Log filter, used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

/// `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSection {
    /// Registry name: `in_memory` or `redis`.
    #[serde(default = "default_queue_kind")]
    pub kind: String,
    /// Redis list key.
    #[serde(default = "default_queue_key")]
    pub key: String,
    /// Redis hostname.
    #[serde(default = "default_redis_hostname")]
    pub hostname: String,
    /// Redis port.
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Bound for the in-memory queue.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Redis connection pool.
    #[serde(default)]
    pub pool: PoolSection,
}

/// `[queue.pool]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_pool_max_size")]
    pub max_size: usize,
    #[serde(default = "default_pool_max_idle")]
    pub max_idle: usize,
    #[serde(default = "default_pool_min_idle")]
    pub min_idle: usize,
    #[serde(default = "default_pool_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_pool_create_timeout_ms")]
    pub create_timeout_ms: u64,
    #[serde(default = "default_pool_recycle_timeout_ms")]
    pub recycle_timeout_ms: u64,
}

/// `[runner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Registry name of the runner.
    #[serde(default = "default_runner_kind")]
    pub kind: String,
    /// Pause after a queue error, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// How long shutdown waits for the runner to finish, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// `[publisher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Config {
    /// Loads defaults, then `hookrelay.toml`, then environment overrides.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or a value is out of range.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Queue construction parameters.
    pub fn to_queue_config(&self) -> QueueConfig {
        let queue = &self.queue;
        QueueConfig {
            kind: queue.kind.clone(),
            key: queue.key.clone(),
            hostname: queue.hostname.clone(),
            port: queue.port,
            capacity: queue.capacity,
            pool: PoolConfig {
                max_size: queue.pool.max_size,
                max_idle: queue.pool.max_idle,
                min_idle: queue.pool.min_idle,
                wait_timeout: Duration::from_millis(queue.pool.wait_timeout_ms),
                create_timeout: Duration::from_millis(queue.pool.create_timeout_ms),
                recycle_timeout: Duration::from_millis(queue.pool.recycle_timeout_ms),
            },
        }
    }

    /// Publisher retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.publisher.max_retries,
            backoff_base: Duration::from_millis(self.publisher.backoff_base_ms),
            backoff_max: Duration::from_millis(self.publisher.backoff_max_ms),
        }
    }

    /// HTTP client settings for the publisher.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.publisher.request_timeout_secs),
            max_redirects: self.publisher.max_redirects,
        }
    }

    /// Runner construction parameters.
    pub fn to_runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            kind: self.runner.kind.clone(),
            error_backoff: Duration::from_millis(self.runner.error_backoff_ms),
        }
    }

    /// Time to wait for the runner after a shutdown signal.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.runner.shutdown_grace_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.kind.trim().is_empty() {
            anyhow::bail!("queue.kind must not be empty");
        }

        if self.queue.key.is_empty() {
            anyhow::bail!("queue.key must not be empty");
        }

        if self.queue.port == 0 {
            anyhow::bail!("queue.port must be greater than 0");
        }

        if self.queue.capacity == Some(0) {
            anyhow::bail!("queue.capacity must be greater than 0 when set");
        }

        if self.queue.pool.max_size == 0 {
            anyhow::bail!("queue.pool.max_size must be greater than 0");
        }

        if self.queue.pool.min_idle > self.queue.pool.max_size {
            anyhow::bail!("queue.pool.min_idle cannot exceed queue.pool.max_size");
        }

        if self.runner.kind.trim().is_empty() {
            anyhow::bail!("runner.kind must not be empty");
        }

        if self.publisher.request_timeout_secs == 0 {
            anyhow::bail!("publisher.request_timeout_secs must be greater than 0");
        }

        if self.publisher.backoff_max_ms == 0 {
            anyhow::bail!("publisher.backoff_max_ms must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueSection::default(),
            runner: RunnerSection::default(),
            publisher: PublisherSection::default(),
            rust_log: default_log_level(),
        }
    }
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            kind: default_queue_kind(),
            key: default_queue_key(),
            hostname: default_redis_hostname(),
            port: default_redis_port(),
            capacity: None,
            pool: PoolSection::default(),
        }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            max_idle: default_pool_max_idle(),
            min_idle: default_pool_min_idle(),
            wait_timeout_ms: default_pool_wait_timeout_ms(),
            create_timeout_ms: default_pool_create_timeout_ms(),
            recycle_timeout_ms: default_pool_recycle_timeout_ms(),
        }
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            kind: default_runner_kind(),
            error_backoff_ms: default_error_backoff_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_queue_kind() -> String {
    IN_MEMORY_QUEUE.to_string()
}

fn default_queue_key() -> String {
    "queue".to_string()
}

fn default_redis_hostname() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_pool_max_size() -> usize {
    10
}

fn default_pool_max_idle() -> usize {
    5
}

fn default_pool_min_idle() -> usize {
    1
}

fn default_pool_wait_timeout_ms() -> u64 {
    5000
}

fn default_pool_create_timeout_ms() -> u64 {
    5000
}

fn default_pool_recycle_timeout_ms() -> u64 {
    2000
}

fn default_runner_kind() -> String {
    SEQUENTIAL_RUNNER.to_string()
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    50
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_log_level() -> String {
    "info,hookrelay=debug,hookrelay_delivery=debug".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn defaults_are_valid_and_match_library_defaults() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.to_queue_config(), QueueConfig::default());
        assert_eq!(config.to_retry_policy(), RetryPolicy::default());
        assert_eq!(config.to_client_config(), ClientConfig::default());
        assert_eq!(config.to_runner_config(), RunnerConfig::default());
        assert_eq!(config.shutdown_grace(), Duration::from_secs(30));
        assert_eq!(config.rust_log, "info,hookrelay=debug,hookrelay_delivery=debug");
    }

    #[test]
    fn loaded_config_keeps_default_log_filter() {
        let _guard = TestEnvGuard::new();

        let config = Config::load().unwrap();

        assert_eq!(config.rust_log, default_log_level());
    }

    #[test]
    fn log_filter_can_be_overridden() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("HOOKRELAY_RUST_LOG", "warn");

        let config = Config::load().unwrap();

        assert_eq!(config.rust_log, "warn");
    }

    #[test]
    fn env_overrides_nested_sections() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("HOOKRELAY_QUEUE__KIND", "redis");
        guard.set_var("HOOKRELAY_QUEUE__KEY", "webhooks");
        guard.set_var("HOOKRELAY_QUEUE__HOSTNAME", "redis.internal");
        guard.set_var("HOOKRELAY_QUEUE__PORT", "6380");
        guard.set_var("HOOKRELAY_QUEUE__POOL__MAX_SIZE", "20");
        guard.set_var("HOOKRELAY_PUBLISHER__MAX_RETRIES", "8");
        guard.set_var("HOOKRELAY_PUBLISHER__BACKOFF_MAX_MS", "60000");
        guard.set_var("HOOKRELAY_RUNNER__ERROR_BACKOFF_MS", "250");

        let config = Config::load().unwrap();

        let queue = config.to_queue_config();
        assert_eq!(queue.kind, "redis");
        assert_eq!(queue.key, "webhooks");
        assert_eq!(queue.redis_url(), "redis://redis.internal:6380/");
        assert_eq!(queue.pool.max_size, 20);
        assert_eq!(queue.pool.max_idle, 5);

        let policy = config.to_retry_policy();
        assert_eq!(policy.max_retries, 8);
        assert_eq!(policy.backoff_max, Duration::from_secs(60));
        assert_eq!(policy.backoff_base, Duration::from_millis(50));

        assert_eq!(config.to_runner_config().error_backoff, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = Config::default();
        config.queue.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.queue.capacity = Some(0);
        assert!(config.validate().is_err());

        config = Config::default();
        config.queue.pool.max_size = 2;
        config.queue.pool.min_idle = 3;
        assert!(config.validate().is_err());

        config = Config::default();
        config.publisher.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.runner.kind = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_env_value_is_a_load_error() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("HOOKRELAY_QUEUE__PORT", "not-a-port");

        assert!(Config::load().is_err());
    }
}
