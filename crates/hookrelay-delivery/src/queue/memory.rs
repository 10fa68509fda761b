//! In-process FIFO backend.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use hookrelay_core::HookRequest;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{HookQueue, Lifecycle, Popped, QueueAction, QueueFuture};
use crate::error::Result;

/// Thread-safe in-process queue with no persistence.
///
/// Push, pop and size work regardless of lifecycle state; only `start` and
/// `stop` are checked. Failed items are reinserted at the tail as the same
/// instance, so retry counter changes made by the action are kept.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    items: Mutex<VecDeque<HookRequest>>,
    available: Notify,
    capacity: Option<usize>,
    lifecycle: Lifecycle,
}

impl InMemoryQueue {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue whose `push` rejects items once `capacity` are
    /// pending. Reinsertion after a failed action ignores the bound.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: Some(capacity), ..Self::default() }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<HookRequest>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn next(&self) -> HookRequest {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let head = self.items().pop_front();
            if let Some(request) = head {
                return request;
            }

            notified.await;
        }
    }

    fn requeue(&self, request: HookRequest) {
        self.items().push_back(request);
        self.available.notify_one();
    }
}

impl HookQueue for InMemoryQueue {
    fn start(&self) -> Result<()> {
        self.lifecycle.start()?;
        debug!(capacity = ?self.capacity, "in-memory queue started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;
        debug!(pending = self.items().len(), "in-memory queue stopped");
        Ok(())
    }

    fn size(&self) -> QueueFuture<'_, Option<usize>> {
        let size = self.items().len();
        Box::pin(async move { Ok(Some(size)) })
    }

    fn push(&self, request: HookRequest) -> QueueFuture<'_, bool> {
        let accepted = {
            let mut items = self.items();
            if self.capacity.is_some_and(|capacity| items.len() >= capacity) {
                false
            } else {
                items.push_back(request);
                true
            }
        };

        if accepted {
            self.available.notify_one();
        } else {
            warn!(capacity = ?self.capacity, "in-memory queue full, rejecting request");
        }

        Box::pin(async move { Ok(accepted) })
    }

    fn pop<'a>(&'a self, action: &'a dyn QueueAction) -> QueueFuture<'a, Popped> {
        Box::pin(async move {
            let mut request = self.next().await;

            match action.call(&mut request).await {
                Ok(()) => Ok(Popped::Completed),
                Err(error) => {
                    warn!(
                        url = %request.url,
                        retries = request.retries,
                        error = %error,
                        "queue action failed, requeueing at tail"
                    );
                    self.requeue(request);
                    Ok(Popped::Requeued)
                },
            }
        })
    }
}
