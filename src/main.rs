//! hookrelay webhook delivery service.
//!
//! Loads configuration, builds the configured queue and runner, and drains
//! the queue until a shutdown signal arrives.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use hookrelay_delivery::{Publisher, Registry};
use tracing::{error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("Starting hookrelay webhook delivery service");

    let queue_config = config.to_queue_config();
    let runner_config = config.to_runner_config();
    info!(
        queue = %queue_config.kind,
        key = %queue_config.key,
        runner = %runner_config.kind,
        max_retries = config.publisher.max_retries,
        "Configuration loaded"
    );

    let registry = Registry::with_defaults();
    let queue = registry.build_queue(&queue_config).context("invalid queue configuration")?;

    let publisher = Publisher::new(config.to_retry_policy(), &config.to_client_config())
        .context("failed to build publisher")?;
    let runner = registry
        .build_runner(&runner_config, queue.clone(), Arc::new(publisher))
        .context("invalid runner configuration")?;

    queue.start().context("failed to start queue")?;
    info!("Queue started");

    let mut runner_handle = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run().await }
    });

    info!("hookrelay is ready to deliver webhooks");

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received, starting graceful shutdown");
            runner.stop();

            tokio::select! {
                _ = tokio::time::sleep(config.shutdown_grace()) => {
                    warn!("Shutdown grace period expired, aborting runner");
                    runner_handle.abort();
                }
                result = &mut runner_handle => log_runner_exit(result),
            }
        }
        result = &mut runner_handle => log_runner_exit(result),
    }

    if let Err(e) = queue.stop() {
        warn!(error = %e, "Queue was not running at shutdown");
    } else {
        info!("Queue stopped");
    }

    info!("hookrelay shutdown complete");
    Ok(())
}

fn log_runner_exit(result: Result<hookrelay_delivery::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Runner stopped"),
        Ok(Err(e)) => error!(error = %e, "Runner exited with error"),
        Err(e) => error!(error = %e, "Runner task failed"),
    }
}

/// Initializes tracing, preferring `RUST_LOG` over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        () = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
