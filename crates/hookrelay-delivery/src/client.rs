//! HTTP client for webhook delivery attempts.
//!
//! Sends exactly one POST per call and reports either the status code or a
//! transport failure. Classification and retries belong to the publisher.

use std::time::{Duration, Instant};

use reqwest::{header::CONTENT_TYPE, Url};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{DeliveryError, PublishError};

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Total timeout for one request, including reading the body.
    pub timeout: Duration,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), max_redirects: 5 }
    }
}

/// One delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest<'a> {
    /// Unique identifier for this attempt, used for log correlation.
    pub delivery_id: Uuid,
    /// Destination URL.
    pub url: &'a Url,
    /// Request body.
    pub body: &'a str,
    /// Value for the `Content-Type` header.
    pub content_type: &'a str,
    /// 1-based attempt number.
    pub attempt_number: u32,
}

/// Response to a delivery attempt. The body has been read and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Total duration of the request.
    pub duration: Duration,
}

/// Thin wrapper over `reqwest::Client` that adds no headers beyond
/// `Content-Type`.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl DeliveryClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: &ClientConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| PublishError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout: config.timeout })
    }

    /// Wraps a caller-built `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client, timeout: ClientConfig::default().timeout }
    }

    /// Performs one POST.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` when no complete response was received,
    /// including when the status line arrived but the body could not be
    /// read.
    pub async fn deliver(
        &self,
        request: DeliveryRequest<'_>,
    ) -> Result<DeliveryResponse, DeliveryError> {
        let span = info_span!(
            "webhook_delivery",
            delivery_id = %request.delivery_id,
            url = %request.url,
            attempt = request.attempt_number
        );

        async move {
            let start_time = Instant::now();
            debug!("sending webhook");

            let response = self
                .client
                .post(request.url.clone())
                .header(CONTENT_TYPE, request.content_type)
                .body(request.body.to_owned())
                .send()
                .await
                .map_err(|e| {
                    warn!(
                        duration_ms = start_time.elapsed().as_millis(),
                        error = %e,
                        "request failed"
                    );
                    self.transport_error(&e)
                })?;

            let status_code = response.status().as_u16();

            if let Err(e) = response.bytes().await {
                warn!(status = status_code, error = %e, "failed to read response body");
                return Err(DeliveryError::body_read(status_code, e.to_string()));
            }

            let duration = start_time.elapsed();
            debug!(status = status_code, duration_ms = duration.as_millis(), "received response");

            Ok(DeliveryResponse { status_code, duration })
        }
        .instrument(span)
        .await
    }

    fn transport_error(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(self.timeout.as_secs())
        } else if error.is_connect() {
            DeliveryError::network(format!("connection failed: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }
}
