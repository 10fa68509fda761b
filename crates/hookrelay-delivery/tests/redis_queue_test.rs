//! Integration tests for the durable backend against a live Redis.
//!
//! Set `REDIS_URL` to point at a server. When none is reachable the tests
//! log a line and return early.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Mutex, time::Duration};

use hookrelay_core::HookRequest;
use hookrelay_delivery::{
    config::REDIS_QUEUE, ActionError, DurableQueue, HookQueue, PoolConfig, Popped, QueueConfig,
    QueueError, StoreError,
};
use reqwest::Url;
use uuid::Uuid;

type ActionResult = Result<(), ActionError>;

fn redis_config() -> QueueConfig {
    let raw = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let url = Url::parse(&raw).expect("REDIS_URL must be a valid URL");

    QueueConfig {
        kind: REDIS_QUEUE.to_string(),
        key: format!("hookrelay-test-{}", Uuid::new_v4()),
        hostname: url.host_str().unwrap_or("127.0.0.1").to_string(),
        port: url.port().unwrap_or(6379),
        ..QueueConfig::default()
    }
}

async fn started_queue() -> Option<DurableQueue> {
    started_queue_with(redis_config()).await
}

async fn started_queue_with(config: QueueConfig) -> Option<DurableQueue> {
    let queue = DurableQueue::new(config.clone());
    queue.start().unwrap();

    match tokio::time::timeout(Duration::from_secs(2), queue.size()).await {
        Ok(Ok(Some(0))) => Some(queue),
        _ => {
            eprintln!("redis not reachable at {}, skipping", config.redis_url());
            queue.stop().unwrap();
            None
        },
    }
}

async fn pop_value(queue: &DurableQueue) -> HookRequest {
    let seen = Mutex::new(None);
    let record = |request: &mut HookRequest| -> ActionResult {
        *seen.lock().unwrap() = Some(request.clone());
        Ok(())
    };
    assert_eq!(queue.pop(&record).await.unwrap(), Popped::Completed);
    seen.into_inner().unwrap().unwrap()
}

#[tokio::test]
async fn items_come_back_in_push_order() {
    let Some(queue) = started_queue().await else { return };

    let mut second =
        HookRequest::new("https://example.com/b", "two").with_content_type("text/plain");
    second.retries = 2;

    queue.push(HookRequest::new("https://example.com/a", "one")).await.unwrap();
    queue.push(second.clone()).await.unwrap();
    assert_eq!(queue.size().await.unwrap(), Some(2));

    assert_eq!(pop_value(&queue).await.url, "https://example.com/a");
    assert_eq!(pop_value(&queue).await, second);
    assert_eq!(queue.size().await.unwrap(), Some(0));

    queue.stop().unwrap();
}

#[tokio::test]
async fn failed_action_puts_item_back_at_head() {
    let Some(queue) = started_queue().await else { return };

    queue.push(HookRequest::new("https://example.com/first", "1")).await.unwrap();
    queue.push(HookRequest::new("https://example.com/second", "2")).await.unwrap();

    let fail = |request: &mut HookRequest| -> ActionResult {
        request.retries = 99;
        Err(ActionError::rejected("downstream unavailable"))
    };
    assert_eq!(queue.pop(&fail).await.unwrap(), Popped::Requeued);
    assert_eq!(queue.size().await.unwrap(), Some(2));

    let head = pop_value(&queue).await;
    assert_eq!(head.url, "https://example.com/first");
    assert_eq!(head.retries, 0);

    assert_eq!(pop_value(&queue).await.url, "https://example.com/second");
    queue.stop().unwrap();
}

#[tokio::test]
async fn restart_after_stop_reconnects() {
    let Some(queue) = started_queue().await else { return };

    queue.push(HookRequest::new("https://example.com/kept", "x")).await.unwrap();
    queue.stop().unwrap();
    assert!(matches!(queue.size().await, Err(QueueError::NotStarted)));

    queue.start().unwrap();
    assert_eq!(queue.size().await.unwrap(), Some(1));
    assert_eq!(pop_value(&queue).await.url, "https://example.com/kept");
    queue.stop().unwrap();
}

#[tokio::test]
async fn failed_commands_return_their_connection() {
    let config = QueueConfig {
        pool: PoolConfig {
            max_size: 1,
            wait_timeout: Duration::from_millis(500),
            ..PoolConfig::default()
        },
        ..redis_config()
    };
    let Some(queue) = started_queue_with(config.clone()).await else { return };

    let client = redis::Client::open(config.redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("SET")
        .arg(&config.key)
        .arg("not a list")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    for _ in 0..5 {
        let push = queue.push(HookRequest::new("https://example.com/x", "x")).await;
        assert!(matches!(push, Err(QueueError::Store(StoreError::Redis(_)))), "{push:?}");

        let size = queue.size().await;
        assert!(matches!(size, Err(QueueError::Store(StoreError::Redis(_)))), "{size:?}");
    }

    redis::cmd("DEL").arg(&config.key).query_async::<()>(&mut conn).await.unwrap();

    let push = tokio::time::timeout(
        Duration::from_secs(2),
        queue.push(HookRequest::new("https://example.com/y", "y")),
    )
    .await
    .expect("push must not wait for a leaked connection");
    assert!(push.unwrap());
    assert_eq!(queue.size().await.unwrap(), Some(1));

    assert_eq!(pop_value(&queue).await.url, "https://example.com/y");
    queue.stop().unwrap();
}
