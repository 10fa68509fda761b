//! Name-based construction of queues and runners.
//!
//! The binary resolves configured kind names through a `Registry` once at
//! startup. Library types never consult it; they take built instances.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    config::{QueueConfig, RunnerConfig, IN_MEMORY_QUEUE, REDIS_QUEUE, SEQUENTIAL_RUNNER},
    publisher::Publisher,
    queue::{DurableQueue, HookQueue, InMemoryQueue},
    runner::{HookRunner, SequentialRunner},
};

/// Builds a queue from its configuration.
pub type QueueConstructor = fn(&QueueConfig) -> Arc<dyn HookQueue>;

/// Builds a runner over a queue and publisher.
pub type RunnerConstructor =
    fn(Arc<dyn HookQueue>, Arc<Publisher>, &RunnerConfig) -> Arc<dyn HookRunner>;

/// Errors raised when resolving a kind name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No queue is registered under this name.
    #[error("unknown queue kind {name:?}, expected one of {known:?}")]
    UnknownQueue {
        /// Requested name
        name: String,
        /// Registered names, sorted
        known: Vec<String>,
    },

    /// No runner is registered under this name.
    #[error("unknown runner kind {name:?}, expected one of {known:?}")]
    UnknownRunner {
        /// Requested name
        name: String,
        /// Registered names, sorted
        known: Vec<String>,
    },
}

/// Maps kind names to constructors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    queues: HashMap<String, QueueConstructor>,
    runners: HashMap<String, RunnerConstructor>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with `in_memory`, `redis` and `sequential`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_queue(IN_MEMORY_QUEUE, build_in_memory);
        registry.register_queue(REDIS_QUEUE, build_durable);
        registry.register_runner(SEQUENTIAL_RUNNER, build_sequential);
        registry
    }

    /// Registers or replaces a queue constructor.
    pub fn register_queue(&mut self, name: impl Into<String>, constructor: QueueConstructor) {
        self.queues.insert(name.into(), constructor);
    }

    /// Registers or replaces a runner constructor.
    pub fn register_runner(&mut self, name: impl Into<String>, constructor: RunnerConstructor) {
        self.runners.insert(name.into(), constructor);
    }

    /// Builds the queue named by `config.kind`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownQueue` for an unregistered name.
    pub fn build_queue(&self, config: &QueueConfig) -> Result<Arc<dyn HookQueue>, RegistryError> {
        let constructor = self.queues.get(&config.kind).ok_or_else(|| RegistryError::UnknownQueue {
            name: config.kind.clone(),
            known: sorted_names(&self.queues),
        })?;
        Ok(constructor(config))
    }

    /// Builds the runner named by `config.kind`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownRunner` for an unregistered name.
    pub fn build_runner(
        &self,
        config: &RunnerConfig,
        queue: Arc<dyn HookQueue>,
        publisher: Arc<Publisher>,
    ) -> Result<Arc<dyn HookRunner>, RegistryError> {
        let constructor =
            self.runners.get(&config.kind).ok_or_else(|| RegistryError::UnknownRunner {
                name: config.kind.clone(),
                known: sorted_names(&self.runners),
            })?;
        Ok(constructor(queue, publisher, config))
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}

fn build_in_memory(config: &QueueConfig) -> Arc<dyn HookQueue> {
    match config.capacity {
        Some(capacity) => Arc::new(InMemoryQueue::with_capacity(capacity)),
        None => Arc::new(InMemoryQueue::new()),
    }
}

fn build_durable(config: &QueueConfig) -> Arc<dyn HookQueue> {
    Arc::new(DurableQueue::new(config.clone()))
}

fn build_sequential(
    queue: Arc<dyn HookQueue>,
    publisher: Arc<Publisher>,
    config: &RunnerConfig,
) -> Arc<dyn HookRunner> {
    Arc::new(SequentialRunner::new(queue, publisher, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_queue_lists_known_names() {
        let registry = Registry::with_defaults();
        let config = QueueConfig { kind: "kafka".to_string(), ..QueueConfig::default() };

        let error = registry.build_queue(&config).err().unwrap();

        assert_eq!(
            error,
            RegistryError::UnknownQueue {
                name: "kafka".to_string(),
                known: vec!["in_memory".to_string(), "redis".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn builds_default_kinds() {
        let registry = Registry::with_defaults();

        let queue = registry.build_queue(&QueueConfig::default()).unwrap();
        assert_eq!(queue.size().await.unwrap(), Some(0));

        let redis = QueueConfig { kind: REDIS_QUEUE.to_string(), ..QueueConfig::default() };
        let durable = registry.build_queue(&redis).unwrap();
        assert!(durable.size().await.is_err());

        let publisher = Arc::new(Publisher::with_defaults().unwrap());
        let runner =
            registry.build_runner(&RunnerConfig::default(), queue, publisher.clone()).unwrap();
        assert!(Arc::ptr_eq(runner.publisher(), &publisher));
    }

    #[test]
    fn unknown_runner_is_rejected() {
        let registry = Registry::new();
        let queue: Arc<dyn HookQueue> = Arc::new(InMemoryQueue::new());
        let publisher = Arc::new(Publisher::with_defaults().unwrap());

        let result = registry.build_runner(&RunnerConfig::default(), queue, publisher);

        assert!(matches!(result, Err(RegistryError::UnknownRunner { .. })));
    }
}
