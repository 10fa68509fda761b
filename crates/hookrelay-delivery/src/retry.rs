//! Retry classification and exponential backoff.

use std::time::Duration;

/// Retry policy for the publisher.
///
/// The delay after the n-th failure is `backoff_base^n` milliseconds, where
/// `backoff_base` is taken as a number of milliseconds, capped at
/// `backoff_max`. With the defaults that yields 50ms, 2500ms, then 10s for
/// every later retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Exponent base, in milliseconds.
    pub backoff_base: Duration,
    /// Upper bound on a single delay.
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Whether a request that has already failed `retries` times may try
    /// again.
    pub fn allows_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Delay to wait before the attempt that follows failure number
    /// `retries`.
    pub fn backoff_delay(&self, retries: u32) -> Duration {
        let base_ms = u64::try_from(self.backoff_base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.backoff_max.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.checked_pow(retries).unwrap_or(u64::MAX).min(max_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Classifies an attempt outcome.
///
/// `None` stands for a transport failure with no usable response. Transport
/// failures, 420, 429 and every 5xx are retryable; every other status is
/// final.
pub fn is_retryable(status: Option<u16>) -> bool {
    match status {
        None | Some(420 | 429 | 500..=599) => true,
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_schedule() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2500));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(10_000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(10_000));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(10_000));
    }

    #[test]
    fn retry_budget_is_exclusive() {
        let policy = RetryPolicy::default();

        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(4));
        assert!(!policy.allows_retry(5));
        assert!(!policy.allows_retry(6));
    }

    #[test]
    fn status_classification() {
        assert!(is_retryable(None));
        assert!(is_retryable(Some(420)));
        assert!(is_retryable(Some(429)));
        assert!(is_retryable(Some(500)));
        assert!(is_retryable(Some(503)));
        assert!(is_retryable(Some(599)));

        assert!(!is_retryable(Some(200)));
        assert!(!is_retryable(Some(301)));
        assert!(!is_retryable(Some(400)));
        assert!(!is_retryable(Some(404)));
        assert!(!is_retryable(Some(600)));
    }
}
