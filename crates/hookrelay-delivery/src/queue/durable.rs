//! Durable backend over a keyed list store.

use std::sync::{Arc, PoisonError, RwLock};

use hookrelay_core::HookRequest;
use tracing::{debug, error, info, warn};

use super::{HookQueue, Lifecycle, Popped, QueueAction, QueueFuture};
use crate::{
    config::QueueConfig,
    error::{QueueError, Result},
    storage::{ListStore, RedisListStore},
};

/// Queue stored as a list in Redis, shared across processes and restarts.
///
/// Items are JSON strings appended with `RPUSH` and taken with a blocking
/// `BLPOP`. When the action fails, the exact string that was popped goes
/// back to the head with `LPUSH`, so the failing item is retried before any
/// other pending item and its stored retry counter is unchanged.
///
/// An item is removed from Redis before the action runs. If the process dies
/// between the pop and the action finishing, that item is lost.
pub struct DurableQueue {
    config: QueueConfig,
    store: RwLock<Option<Arc<dyn ListStore>>>,
    lifecycle: Lifecycle,
}

impl DurableQueue {
    /// Creates a queue that builds its Redis store on `start`.
    pub fn new(config: QueueConfig) -> Self {
        Self { config, store: RwLock::new(None), lifecycle: Lifecycle::new() }
    }

    /// Creates a queue over an already built store.
    ///
    /// The first `start` uses this store instead of building one. After
    /// `stop` closes it, a later `start` builds a fresh Redis store.
    pub fn with_store(config: QueueConfig, store: Arc<dyn ListStore>) -> Self {
        Self { config, store: RwLock::new(Some(store)), lifecycle: Lifecycle::new() }
    }

    /// The list key this queue reads and writes.
    pub fn key(&self) -> &str {
        &self.config.key
    }

    fn current_store(&self) -> Result<Arc<dyn ListStore>> {
        self.lifecycle.ensure_started()?;
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(QueueError::NotStarted)
    }
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("config", &self.config)
            .field("started", &self.lifecycle.is_started())
            .finish_non_exhaustive()
    }
}

impl HookQueue for DurableQueue {
    fn start(&self) -> Result<()> {
        self.lifecycle.start()?;

        let mut slot = self.store.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            match RedisListStore::connect(&self.config.redis_url(), &self.config.pool) {
                Ok(store) => *slot = Some(Arc::new(store)),
                Err(error) => {
                    self.lifecycle.abort_start();
                    error!(error = %error, "failed to create redis store");
                    return Err(error.into());
                },
            }
        }

        info!(
            key = %self.config.key,
            hostname = %self.config.hostname,
            port = self.config.port,
            "durable queue started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;

        let store = self.store.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(store) = store {
            store.close();
        }

        info!(key = %self.config.key, "durable queue stopped");
        Ok(())
    }

    fn size(&self) -> QueueFuture<'_, Option<usize>> {
        Box::pin(async move {
            let store = self.current_store()?;
            Ok(Some(store.len(&self.config.key).await?))
        })
    }

    fn push(&self, request: HookRequest) -> QueueFuture<'_, bool> {
        Box::pin(async move {
            let store = self.current_store()?;
            let raw = request.to_wire()?;
            store.push_back(&self.config.key, raw).await?;
            debug!(key = %self.config.key, url = %request.url, "request pushed");
            Ok(true)
        })
    }

    fn pop<'a>(&'a self, action: &'a dyn QueueAction) -> QueueFuture<'a, Popped> {
        Box::pin(async move {
            let store = self.current_store()?;
            let raw = store.pop_front_blocking(&self.config.key).await?;

            let mut request = match HookRequest::from_wire(&raw) {
                Ok(request) => request,
                Err(error) => {
                    error!(key = %self.config.key, error = %error, "dropping undecodable item");
                    return Err(error.into());
                },
            };

            match action.call(&mut request).await {
                Ok(()) => Ok(Popped::Completed),
                Err(action_error) => {
                    warn!(
                        key = %self.config.key,
                        url = %request.url,
                        error = %action_error,
                        "queue action failed, requeueing at head"
                    );
                    store.push_front(&self.config.key, raw).await?;
                    Ok(Popped::Requeued)
                },
            }
        })
    }
}
