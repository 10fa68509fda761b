//! Dispatch runners that drain a queue through a publisher.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use hookrelay_core::{Clock, HookRequest, RealClock};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::RunnerConfig,
    error::{ActionError, PublishError, Result},
    publisher::{DeliveryOutcome, Publisher},
    queue::{HookQueue, Popped, QueueAction},
};

/// Counters describing what a runner has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Items handed to the publisher.
    pub processed: u64,
    /// Items the publisher reported as delivered.
    pub delivered: u64,
    /// Items dropped after exhausting retries.
    pub gave_up: u64,
    /// Items dropped because their URL could not be used.
    pub rejected: u64,
    /// Items the queue reinserted after the action failed.
    ///
    /// The built-in `Publisher` reports every delivery result through its
    /// outcome and only fails early on an unusable URL, which is dropped, so
    /// this stays at zero unless `publish` gains another error path.
    pub action_failures: u64,
}

/// A loop that moves requests from a queue to a publisher.
pub trait HookRunner: Send + Sync {
    /// Runs until stopped.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error from the queue, such as popping from a
    /// stopped durable backend. Store and serialization errors are logged and
    /// the loop continues.
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Requests the loop to end after the item in flight.
    fn stop(&self);

    /// The publisher this runner delivers with.
    fn publisher(&self) -> &Arc<Publisher>;
}

/// Single-loop runner with exactly one item in flight.
///
/// `stop` is cooperative: it never interrupts a waiting pop or a backoff
/// sleep, and takes effect once the current iteration finishes.
pub struct SequentialRunner {
    queue: Arc<dyn HookQueue>,
    publisher: Arc<Publisher>,
    error_backoff: Duration,
    cancellation_token: CancellationToken,
    stats: RwLock<RunnerStats>,
    clock: Arc<dyn Clock>,
}

impl SequentialRunner {
    /// Creates a runner over `queue` and `publisher`.
    pub fn new(
        queue: Arc<dyn HookQueue>,
        publisher: Arc<Publisher>,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            queue,
            publisher,
            error_backoff: config.error_backoff,
            cancellation_token: CancellationToken::new(),
            stats: RwLock::new(RunnerStats::default()),
            clock: Arc::new(RealClock::new()),
        }
    }

    /// Replaces the clock used for error pauses.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshot of the runner's counters.
    pub async fn stats(&self) -> RunnerStats {
        *self.stats.read().await
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    async fn run_loop(&self) -> Result<()> {
        info!("dispatch runner starting");

        let action = PublishAction { publisher: &self.publisher, stats: &self.stats };

        while !self.cancellation_token.is_cancelled() {
            match self.queue.pop(&action).await {
                Ok(Popped::Completed) => {},
                Ok(Popped::Requeued) => {
                    self.stats.write().await.action_failures += 1;
                },
                Err(error) if error.is_lifecycle() => {
                    error!(error = %error, "queue is not usable, dispatch runner exiting");
                    return Err(error);
                },
                Err(error) => {
                    error!(
                        error = %error,
                        backoff_ms = self.error_backoff.as_millis(),
                        "failed to pop request"
                    );
                    self.clock.sleep(self.error_backoff).await;
                },
            }
        }

        info!("dispatch runner stopped");
        Ok(())
    }
}

impl HookRunner for SequentialRunner {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.run_loop())
    }

    fn stop(&self) {
        debug!("dispatch runner stop requested");
        self.cancellation_token.cancel();
    }

    fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }
}

struct PublishAction<'r> {
    publisher: &'r Publisher,
    stats: &'r RwLock<RunnerStats>,
}

impl QueueAction for PublishAction<'_> {
    fn call<'a>(
        &'a self,
        request: &'a mut HookRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), ActionError>> + Send + 'a>> {
        Box::pin(async move {
            let outcome = self.publisher.publish(request).await;

            let mut stats = self.stats.write().await;
            stats.processed += 1;

            match outcome {
                Ok(DeliveryOutcome::Delivered) => {
                    stats.delivered += 1;
                    Ok(())
                },
                Ok(DeliveryOutcome::GaveUp) => {
                    stats.gave_up += 1;
                    warn!(
                        url = %request.url,
                        retries = request.retries,
                        "giving up on webhook, request dropped"
                    );
                    Ok(())
                },
                Err(PublishError::InvalidUrl { url, reason }) => {
                    stats.rejected += 1;
                    error!(url = %url, reason = %reason, "unusable webhook url, request dropped");
                    Ok(())
                },
                Err(error) => Err(ActionError::from(error)),
            }
        })
    }
}
