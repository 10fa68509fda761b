//! Webhook queueing and delivery.
//!
//! Requests wait on a `HookQueue`, a `HookRunner` pops them one at a time and
//! hands each to the `Publisher`, which POSTs it and retries transient
//! failures with exponential backoff.
//!
//! # Architecture
//!
//! 1. **Queue** - `InMemoryQueue` (process-local FIFO) or `DurableQueue`
//!    (Redis list behind a pooled `ListStore`)
//! 2. **Runner** - `SequentialRunner` pops with a publishing action
//! 3. **Publisher** - one POST per attempt; transport failures, 420, 429 and
//!    5xx are retried up to `max_retries` times
//! 4. **Requeue** - if the action fails, the queue puts the item back
//!
//! # Delivery guarantees
//!
//! Neither backend offers exactly-once delivery. The durable backend removes
//! an item with `BLPOP` before the action runs, so an item in flight when the
//! process dies is lost. Requests that exhaust their retries are dropped, not
//! requeued.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hookrelay_core::HookRequest;
//! use hookrelay_delivery::{
//!     HookQueue, HookRunner, InMemoryQueue, Publisher, RunnerConfig, SequentialRunner,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue: Arc<dyn HookQueue> = Arc::new(InMemoryQueue::new());
//! queue.start()?;
//! queue.push(HookRequest::new("https://example.com/hook", "{}")).await?;
//!
//! let publisher = Arc::new(Publisher::with_defaults()?);
//! let runner = SequentialRunner::new(queue, publisher, &RunnerConfig::default());
//! runner.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod storage;

pub use config::{PoolConfig, QueueConfig, RunnerConfig};
pub use error::{ActionError, DeliveryError, PublishError, QueueError, Result, StoreError};
pub use publisher::{DeliveryOutcome, Publisher};
pub use queue::{DurableQueue, HookQueue, InMemoryQueue, Lifecycle, Popped, QueueAction};
pub use registry::{Registry, RegistryError};
pub use retry::RetryPolicy;
pub use runner::{HookRunner, RunnerStats, SequentialRunner};
