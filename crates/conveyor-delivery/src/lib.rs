//! Webhook delivery with bounded retries and attempt auditing.
//!
//! This crate implements the outbound half of the pipeline: a safety filter
//! on destination URLs, an HTTP client with timeout and transport-error
//! classification, a fixed backoff schedule, and the engine that ties them
//! together while writing the append-only attempt log.
//!
//! Outcome classification follows the receiver contract: any HTTP status
//! below 500 is terminal (delivered, possibly rejected), while 5xx responses
//! and transport failures are retryable.

#![forbid(unsafe_code)]

pub mod client;
pub mod engine;
pub mod error;
pub mod retry;
pub mod ssrf;

pub use engine::{DeliveryConfig, DeliveryEngine};
pub use error::{DeliveryError, Result};
pub use ssrf::is_safe_callback_url;
