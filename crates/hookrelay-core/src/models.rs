//! Webhook request entity and its wire representation.
//!
//! A `HookRequest` is the unit of work moved through the queue backends. The
//! durable backend stores it as a JSON string using the field names
//! `retries`, `url`, `postData`, `deliverAfter` and `contentType`, which lets
//! producers written in other languages share the same list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Content type used when a request does not specify one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A single outbound webhook.
///
/// The entity is mutable: the publisher increments `retries` once per failed
/// attempt. Only one delivery attempt may be in flight per instance.
///
/// # Example
///
/// ```
/// use hookrelay_core::HookRequest;
///
/// let request = HookRequest::new("https://example.com/hook", r#"{"id":1}"#);
/// assert_eq!(request.retries, 0);
/// assert_eq!(request.resolved_content_type(), "application/json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRequest {
    /// Number of failed attempts so far.
    ///
    /// Continues from its current value when the same entity is published
    /// again; it is never reset by the pipeline.
    #[serde(default)]
    pub retries: u32,

    /// Absolute HTTP(S) target.
    pub url: String,

    /// Body sent with every attempt.
    #[serde(rename = "postData", default)]
    pub payload: String,

    /// Earliest delivery time.
    ///
    /// Carried through serialization but not consulted by any component.
    #[serde(default)]
    pub deliver_after: Option<DateTime<Utc>>,

    /// MIME type of the payload.
    ///
    /// Absent and empty values are both replaced by `DEFAULT_CONTENT_TYPE` at
    /// send time.
    #[serde(default)]
    pub content_type: Option<String>,
}

impl HookRequest {
    /// Creates a request with no retries and no explicit content type.
    pub fn new(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            retries: 0,
            url: url.into(),
            payload: payload.into(),
            deliver_after: None,
            content_type: None,
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the inert `deliver_after` timestamp.
    #[must_use]
    pub fn with_deliver_after(mut self, deliver_after: DateTime<Utc>) -> Self {
        self.deliver_after = Some(deliver_after);
        self
    }

    /// Content type to send, falling back to `application/json`.
    pub fn resolved_content_type(&self) -> &str {
        match self.content_type.as_deref() {
            Some(content_type) if !content_type.is_empty() => content_type,
            _ => DEFAULT_CONTENT_TYPE,
        }
    }

    /// Checks the invariants required before a delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRequest` when the URL is empty.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(CoreError::invalid_request("url must not be empty"));
        }
        Ok(())
    }

    /// Encodes the request into its JSON wire string.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if encoding fails.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a request from its JSON wire string.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` for malformed input or a missing
    /// `url` field.
    pub fn from_wire(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
