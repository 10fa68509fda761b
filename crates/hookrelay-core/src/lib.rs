//! Core request model and shared primitives.
//!
//! Defines the webhook request entity that flows through every queue backend,
//! its wire representation, the core error type, and the clock abstraction
//! used for backoff timing. All other hookrelay crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{HookRequest, DEFAULT_CONTENT_TYPE};
pub use time::{Clock, RealClock, TestClock};
