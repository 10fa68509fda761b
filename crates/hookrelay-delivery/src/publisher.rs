//! Webhook publisher with bounded retries.
//!
//! `publish` drives one request through at most `max_retries + 1` attempts.
//! The request's `retries` counter is incremented before each backoff sleep
//! and is never reset, so publishing the same request again continues from
//! where the previous call stopped.

use std::sync::Arc;

use hookrelay_core::{Clock, HookRequest, RealClock};
use reqwest::Url;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{ClientConfig, DeliveryClient, DeliveryRequest},
    error::PublishError,
    retry::{is_retryable, RetryPolicy},
};

/// Final result of `Publisher::publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target answered with a status that is not retried.
    ///
    /// This includes 4xx statuses other than 420 and 429: they are final but
    /// are still reported here.
    Delivered,
    /// Every allowed attempt hit a retryable outcome.
    GaveUp,
}

impl DeliveryOutcome {
    /// Returns true for `Delivered`.
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends webhooks over HTTP, retrying transient failures.
#[derive(Debug, Clone)]
pub struct Publisher {
    client: DeliveryClient,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Publisher {
    /// Creates a publisher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(policy: RetryPolicy, config: &ClientConfig) -> Result<Self, PublishError> {
        Ok(Self { client: DeliveryClient::new(config)?, policy, clock: Arc::new(RealClock::new()) })
    }

    /// Creates a publisher with default policy and client settings.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self, PublishError> {
        Self::new(RetryPolicy::default(), &ClientConfig::default())
    }

    /// Creates a publisher over a caller-built `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            client: DeliveryClient::from_client(client),
            policy,
            clock: Arc::new(RealClock::new()),
        }
    }

    /// Replaces the clock used for backoff sleeps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `request`, retrying retryable outcomes with backoff.
    ///
    /// Increments `request.retries` once per failed attempt that is followed
    /// by another attempt. When the counter has already reached
    /// `max_retries`, a retryable outcome gives up without touching it.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::InvalidUrl` without attempting delivery when the
    /// URL is empty, unparsable or not HTTP(S).
    pub async fn publish(
        &self,
        request: &mut HookRequest,
    ) -> Result<DeliveryOutcome, PublishError> {
        request.validate().map_err(|e| PublishError::invalid_url(&request.url, e.to_string()))?;
        let url = parse_target(&request.url)?;

        loop {
            let attempt_number = request.retries.saturating_add(1);
            let delivery_id = Uuid::new_v4();

            let status = match self
                .client
                .deliver(DeliveryRequest {
                    delivery_id,
                    url: &url,
                    body: &request.payload,
                    content_type: request.resolved_content_type(),
                    attempt_number,
                })
                .await
            {
                Ok(response) => Some(response.status_code),
                Err(error) => {
                    debug!(%delivery_id, error = %error, "delivery attempt failed in transport");
                    None
                },
            };

            if !is_retryable(status) {
                info!(
                    %delivery_id,
                    url = %request.url,
                    status,
                    attempt_number,
                    "webhook delivered"
                );
                return Ok(DeliveryOutcome::Delivered);
            }

            if !self.policy.allows_retry(request.retries) {
                warn!(
                    url = %request.url,
                    retries = request.retries,
                    max_retries = self.policy.max_retries,
                    status,
                    "retry budget exhausted"
                );
                return Ok(DeliveryOutcome::GaveUp);
            }

            request.retries += 1;
            let delay = self.policy.backoff_delay(request.retries);
            debug!(
                url = %request.url,
                retries = request.retries,
                delay_ms = delay.as_millis(),
                status,
                "retrying after backoff"
            );
            self.clock.sleep(delay).await;
        }
    }
}

fn parse_target(raw: &str) -> Result<Url, PublishError> {
    let url = Url::parse(raw).map_err(|e| PublishError::invalid_url(raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(PublishError::invalid_url(raw, format!("unsupported scheme {scheme:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(parse_target("not a url"), Err(PublishError::InvalidUrl { .. })));
        assert!(matches!(
            parse_target("ftp://example.com/x"),
            Err(PublishError::InvalidUrl { .. })
        ));
        assert!(parse_target("https://example.com/hook?x=1").is_ok());
    }

    #[tokio::test]
    async fn blank_url_fails_request_validation() {
        let publisher = Publisher::with_defaults().unwrap();
        let mut request = HookRequest::new("  ", "{}");

        let error = publisher.publish(&mut request).await.unwrap_err();

        match error {
            PublishError::InvalidUrl { url, reason } => {
                assert_eq!(url, "  ");
                assert!(reason.contains("url must not be empty"), "reason {reason:?}");
            },
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(request.retries, 0);
    }

    #[test]
    fn outcome_boolean_contract() {
        assert!(DeliveryOutcome::Delivered.is_delivered());
        assert!(!DeliveryOutcome::GaveUp.is_delivered());
    }
}
