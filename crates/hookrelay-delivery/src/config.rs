//! Construction parameters for queue backends and runners.

use std::time::Duration;

/// Queue kind identifier for the in-process backend.
pub const IN_MEMORY_QUEUE: &str = "in_memory";

/// Queue kind identifier for the Redis-backed durable backend.
pub const REDIS_QUEUE: &str = "redis";

/// Runner kind identifier for the single-loop runner.
pub const SEQUENTIAL_RUNNER: &str = "sequential";

/// Queue backend selection and settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Registry name of the backend.
    pub kind: String,
    /// Redis list key.
    pub key: String,
    /// Redis hostname.
    pub hostname: String,
    /// Redis port.
    pub port: u16,
    /// Bound for the in-process backend; `None` means unbounded.
    pub capacity: Option<usize>,
    /// Connection pool tuning for the durable backend.
    pub pool: PoolConfig,
}

impl QueueConfig {
    /// Connection URL for the configured Redis host.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.hostname, self.port)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: IN_MEMORY_QUEUE.to_string(),
            key: "queue".to_string(),
            hostname: "localhost".to_string(),
            port: 6379,
            capacity: None,
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections.
    pub max_size: usize,
    /// Idle connections above this count are closed after each release.
    pub max_idle: usize,
    /// Raises the trim threshold when larger than `max_idle`.
    ///
    /// No connections are opened ahead of use to reach this count; it only
    /// limits how many idle ones trimming may close.
    pub min_idle: usize,
    /// How long a caller waits for a free connection.
    pub wait_timeout: Duration,
    /// How long opening a connection may take.
    pub create_timeout: Duration,
    /// How long the PING health check may take on checkout.
    pub recycle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_idle: 5,
            min_idle: 1,
            wait_timeout: Duration::from_secs(5),
            create_timeout: Duration::from_secs(5),
            recycle_timeout: Duration::from_secs(2),
        }
    }
}

/// Runner selection and settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Registry name of the runner.
    pub kind: String,
    /// Pause after a store or serialization error before popping again.
    pub error_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { kind: SEQUENTIAL_RUNNER.to_string(), error_backoff: Duration::from_secs(1) }
    }
}
