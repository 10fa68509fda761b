//! List store abstraction for the durable queue backend.
//!
//! `DurableQueue` only needs four list primitives: append, prepend, blocking
//! head removal and length. `RedisListStore` maps them onto `RPUSH`, `LPUSH`,
//! `BLPOP` and `LLEN` over a `deadpool` connection pool; the `mock` module
//! offers an in-memory equivalent for tests.

use std::{cell::Cell, future::Future, pin::Pin};

use deadpool::{
    managed::{self, Metrics, Object, Pool, RecycleResult},
    Runtime,
};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisError};
use tracing::{debug, trace};

use crate::{config::PoolConfig, error::StoreError};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Keyed list operations required by the durable backend.
pub trait ListStore: Send + Sync + 'static {
    /// Appends a value to the tail of the list at `key`.
    fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    /// Prepends a value to the head of the list at `key`.
    fn push_front<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    /// Removes and returns the head of the list at `key`, waiting
    /// indefinitely for one to arrive.
    fn pop_front_blocking<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String>;

    /// Number of values in the list at `key`.
    fn len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, usize>;

    /// Releases every resource held by the store. Later calls fail with
    /// `StoreError::Closed`.
    fn close(&self);
}

/// `deadpool` manager that opens multiplexed Redis connections and checks
/// them with `PING` on every checkout.
#[derive(Debug)]
pub struct RedisConnectionManager {
    client: Client,
}

impl RedisConnectionManager {
    /// Creates a manager for the given connection URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Redis` if the URL cannot be parsed.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Ok(Self { client: Client::open(url)? })
    }
}

impl managed::Manager for RedisConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<RedisError> {
        redis::cmd("PING").query_async::<()>(conn).await?;
        Ok(())
    }
}

/// Pool of health-checked Redis connections.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Redis implementation of `ListStore`.
///
/// Each operation checks out one connection, runs exactly one command and
/// returns the connection to the pool when the guard drops, on success and
/// failure alike. Idle connections beyond `max(max_idle, min_idle)` are then
/// closed. Idle connections are never opened ahead of demand.
pub struct RedisListStore {
    pool: RedisPool,
    keep_idle: usize,
}

impl RedisListStore {
    /// Builds a store with a fresh pool for `url`.
    ///
    /// Connections are opened lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Redis` for an invalid URL and `StoreError::Pool`
    /// if the pool cannot be built.
    pub fn connect(url: &str, config: &PoolConfig) -> Result<Self, StoreError> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder(manager)
            .max_size(config.max_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(config.wait_timeout))
            .create_timeout(Some(config.create_timeout))
            .recycle_timeout(Some(config.recycle_timeout))
            .build()
            .map_err(|e| StoreError::pool(format!("failed to build connection pool: {e}")))?;

        debug!(max_size = config.max_size, max_idle = config.max_idle, "redis pool created");

        Ok(Self::with_pool(pool, config))
    }

    /// Wraps an existing pool.
    pub fn with_pool(pool: RedisPool, config: &PoolConfig) -> Self {
        Self { pool, keep_idle: config.max_idle.max(config.min_idle) }
    }

    async fn connection(&self) -> Result<Object<RedisConnectionManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    fn trim_idle(&self) {
        let idle = self.pool.status().available;
        if idle <= self.keep_idle {
            return;
        }

        let excess = Cell::new(idle - self.keep_idle);
        let _ = self.pool.retain(|_, _| {
            if excess.get() == 0 {
                return true;
            }
            excess.set(excess.get() - 1);
            false
        });
        trace!(idle, keep = self.keep_idle, "trimmed idle redis connections");
    }
}

impl ListStore for RedisListStore {
    fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = {
                let mut conn = self.connection().await?;
                conn.rpush::<_, _, ()>(key, value).await
            };
            self.trim_idle();
            Ok(result?)
        })
    }

    fn push_front<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = {
                let mut conn = self.connection().await?;
                conn.lpush::<_, _, ()>(key, value).await
            };
            self.trim_idle();
            Ok(result?)
        })
    }

    fn pop_front_blocking<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String> {
        Box::pin(async move {
            loop {
                let result = {
                    let mut conn = self.connection().await?;
                    redis::cmd("BLPOP")
                        .arg(key)
                        .arg(0)
                        .query_async::<Option<(String, String)>>(&mut *conn)
                        .await
                };
                self.trim_idle();

                if let Some((_, value)) = result? {
                    return Ok(value);
                }
            }
        })
    }

    fn len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let result = {
                let mut conn = self.connection().await?;
                conn.llen::<_, usize>(key).await
            };
            self.trim_idle();
            Ok(result?)
        })
    }

    fn close(&self) {
        self.pool.close();
        debug!("redis pool closed");
    }
}

pub mod mock {
    //! In-memory list store for testing the durable backend without Redis.
    //!
    //! Supports injecting a one-shot failure and inspecting list contents.

    use std::{
        collections::{HashMap, VecDeque},
        sync::atomic::{AtomicBool, Ordering},
    };

    use tokio::sync::{Mutex, Notify};

    use super::{ListStore, StoreFuture};
    use crate::error::StoreError;

    /// Mock list store holding raw strings per key.
    #[derive(Debug, Default)]
    pub struct MockListStore {
        lists: Mutex<HashMap<String, VecDeque<String>>>,
        available: Notify,
        fail_next: AtomicBool,
        closed: AtomicBool,
    }

    impl MockListStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next operation fail with a pool error.
        pub fn inject_failure(&self) {
            self.fail_next.store(true, Ordering::Release);
        }

        /// Snapshot of the list at `key`, head first.
        pub async fn items(&self, key: &str) -> Vec<String> {
            let lists = self.lists.lock().await;
            lists.get(key).map(|list| list.iter().cloned().collect()).unwrap_or_default()
        }

        /// Whether `close` has been called.
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.is_closed() {
                return Err(StoreError::Closed);
            }
            if self.fail_next.swap(false, Ordering::AcqRel) {
                return Err(StoreError::pool("injected failure"));
            }
            Ok(())
        }
    }

    impl ListStore for MockListStore {
        fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                self.check()?;
                self.lists.lock().await.entry(key.to_string()).or_default().push_back(value);
                self.available.notify_waiters();
                Ok(())
            })
        }

        fn push_front<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                self.check()?;
                self.lists.lock().await.entry(key.to_string()).or_default().push_front(value);
                self.available.notify_waiters();
                Ok(())
            })
        }

        fn pop_front_blocking<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String> {
            Box::pin(async move {
                self.check()?;
                loop {
                    let notified = self.available.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let head = self.lists.lock().await.get_mut(key).and_then(VecDeque::pop_front);
                    if let Some(value) = head {
                        return Ok(value);
                    }

                    notified.await;
                    if self.is_closed() {
                        return Err(StoreError::Closed);
                    }
                }
            })
        }

        fn len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, usize> {
            Box::pin(async move {
                self.check()?;
                Ok(self.lists.lock().await.get(key).map_or(0, VecDeque::len))
            })
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
            self.available.notify_waiters();
        }
    }
}
