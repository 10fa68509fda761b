//! Error types for queue, store, and delivery operations.
//!
//! Lifecycle misuse is reported as `QueueError::AlreadyStarted` or
//! `QueueError::NotStarted` and is always surfaced to the caller. Transport
//! failures during delivery never escape the publisher; they are folded into
//! the retry loop and only the final `DeliveryOutcome` is reported.

use deadpool::managed::PoolError;
use hookrelay_core::CoreError;
use redis::RedisError;
use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `start` was called on a backend that is already running.
    #[error("queue already started")]
    AlreadyStarted,

    /// An operation that needs a running backend was called before `start`
    /// or after `stop`.
    #[error("queue not started")]
    NotStarted,

    /// A stored item could not be encoded or decoded.
    #[error("queued request could not be (de)serialized: {0}")]
    Serialization(#[from] CoreError),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Returns true for errors caused by calling an operation in the wrong
    /// lifecycle state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::AlreadyStarted | Self::NotStarted)
    }
}

/// Errors raised by list stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A Redis command or connection failed.
    #[error("redis command failed: {0}")]
    Redis(#[from] RedisError),

    /// The connection pool could not provide a connection.
    #[error("connection pool error: {message}")]
    Pool {
        /// Description of the pool failure
        message: String,
    },

    /// The store was closed by `stop`.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a pool error from a message.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool { message: message.into() }
    }
}

impl From<PoolError<RedisError>> for StoreError {
    fn from(error: PoolError<RedisError>) -> Self {
        match error {
            PoolError::Backend(error) => Self::Redis(error),
            PoolError::Closed => Self::Closed,
            other => Self::pool(other.to_string()),
        }
    }
}

/// Transport-level failure of a single delivery attempt.
///
/// Every variant counts as retryable; HTTP status classification happens on
/// successful responses only.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection could not be established or the request failed in flight.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// A status line arrived but the body could not be read.
    #[error("failed to read response body after HTTP {status_code}: {message}")]
    BodyRead {
        /// Status code that preceded the failed read
        status_code: u16,
        /// Error message describing the read failure
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a body read error.
    pub fn body_read(status_code: u16, message: impl Into<String>) -> Self {
        Self::BodyRead { status_code, message: message.into() }
    }
}

/// Errors returned by `Publisher` construction and `publish`.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The request URL is empty, unparsable, or not HTTP(S).
    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("invalid client configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl PublishError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into(), reason: reason.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Failure reported by a `QueueAction`.
///
/// Returning this from an action makes the backend reinsert the item.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// Publishing failed outside the retry loop.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The action declined to process the request.
    #[error("request rejected: {reason}")]
    Rejected {
        /// Why the request was rejected
        reason: String,
    },
}

impl ActionError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_identified() {
        assert!(QueueError::AlreadyStarted.is_lifecycle());
        assert!(QueueError::NotStarted.is_lifecycle());
        assert!(!QueueError::Store(StoreError::Closed).is_lifecycle());
    }

    #[test]
    fn pool_errors_map_to_store_errors() {
        assert!(matches!(StoreError::from(PoolError::<RedisError>::Closed), StoreError::Closed));
        assert!(matches!(
            StoreError::from(PoolError::<RedisError>::NoRuntimeSpecified),
            StoreError::Pool { .. }
        ));
    }

    #[test]
    fn error_display_format() {
        assert_eq!(QueueError::NotStarted.to_string(), "queue not started");
        assert_eq!(DeliveryError::timeout(30).to_string(), "request timeout after 30s");
        assert_eq!(
            PublishError::invalid_url("", "url is empty").to_string(),
            "invalid webhook url \"\": url is empty"
        );
        assert_eq!(
            ActionError::from(PublishError::configuration("bad")).to_string(),
            "invalid client configuration: bad"
        );
    }
}
