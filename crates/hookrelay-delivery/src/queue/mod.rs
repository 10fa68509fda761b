//! Queue backend abstraction.
//!
//! A `HookQueue` owns pending `HookRequest`s and hands them, one at a time,
//! to a `QueueAction`. When the action fails the backend puts the item back;
//! this is the only recovery path for failed deliveries. Where the item goes
//! back differs per backend:
//!
//! - `InMemoryQueue` reinserts the same (possibly mutated) instance at the
//!   tail.
//! - `DurableQueue` reinserts the originally stored string at the head.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
};

use hookrelay_core::HookRequest;

use crate::error::{ActionError, QueueError, Result};

mod durable;
mod memory;

pub use durable::DurableQueue;
pub use memory::InMemoryQueue;

/// Boxed future returned by queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What happened to a popped item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popped {
    /// The action succeeded and the item is gone.
    Completed,
    /// The action failed and the item was put back.
    Requeued,
}

/// Work applied to each popped request.
pub trait QueueAction: Send + Sync {
    /// Processes one request. An error makes the backend reinsert the item.
    fn call<'a>(
        &'a self,
        request: &'a mut HookRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), ActionError>> + Send + 'a>>;
}

impl<F> QueueAction for F
where
    F: Fn(&mut HookRequest) -> std::result::Result<(), ActionError> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a mut HookRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), ActionError>> + Send + 'a>> {
        Box::pin(std::future::ready(self(request)))
    }
}

/// Pluggable queue backend.
///
/// Backends start Stopped. `start` and `stop` are strict: starting twice or
/// stopping a stopped backend is an error.
pub trait HookQueue: Send + Sync + 'static {
    /// Transitions Stopped to Started, allocating resources if needed.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AlreadyStarted` if already started, or a store
    /// error if resources cannot be allocated.
    fn start(&self) -> Result<()>;

    /// Transitions Started to Stopped, releasing allocated resources.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotStarted` if not started.
    fn stop(&self) -> Result<()>;

    /// Number of pending items, or `None` if the backend cannot tell cheaply.
    fn size(&self) -> QueueFuture<'_, Option<usize>>;

    /// Enqueues a request. Resolves to `false` when the backend rejects it.
    fn push(&self, request: HookRequest) -> QueueFuture<'_, bool>;

    /// Waits for the next item, removes it and runs `action` on it.
    ///
    /// A failing action is logged and the item is reinserted; the failure is
    /// reported as `Popped::Requeued` rather than an error.
    fn pop<'a>(&'a self, action: &'a dyn QueueAction) -> QueueFuture<'a, Popped>;
}

/// Started/Stopped flag shared by backend implementations.
#[derive(Debug, Default)]
pub struct Lifecycle {
    started: AtomicBool,
}

impl Lifecycle {
    /// Creates a stopped lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the lifecycle started.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AlreadyStarted` if it already was.
    pub fn start(&self) -> Result<()> {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::AlreadyStarted)
    }

    /// Marks the lifecycle stopped.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotStarted` if it was not started.
    pub fn stop(&self) -> Result<()> {
        self.started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::NotStarted)
    }

    /// Whether the lifecycle is started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// # Errors
    ///
    /// Returns `QueueError::NotStarted` unless started.
    pub fn ensure_started(&self) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(QueueError::NotStarted)
        }
    }

    /// Rolls back a `start` whose resource allocation failed.
    pub(crate) fn abort_start(&self) {
        self.started.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_strict() {
        let lifecycle = Lifecycle::new();

        assert!(matches!(lifecycle.stop(), Err(QueueError::NotStarted)));
        assert!(matches!(lifecycle.ensure_started(), Err(QueueError::NotStarted)));

        lifecycle.start().unwrap();
        assert!(lifecycle.is_started());
        assert!(matches!(lifecycle.start(), Err(QueueError::AlreadyStarted)));

        lifecycle.stop().unwrap();
        assert!(!lifecycle.is_started());
        lifecycle.start().unwrap();
    }

    #[tokio::test]
    async fn closures_act_as_queue_actions() {
        let bump = |request: &mut HookRequest| -> std::result::Result<(), ActionError> {
            request.retries += 1;
            Ok(())
        };
        let reject = |_: &mut HookRequest| -> std::result::Result<(), ActionError> {
            Err(ActionError::rejected("nope"))
        };

        let mut request = HookRequest::new("http://x", "");
        bump.call(&mut request).await.unwrap();
        assert_eq!(request.retries, 1);
        assert!(reject.call(&mut request).await.is_err());
    }
}
