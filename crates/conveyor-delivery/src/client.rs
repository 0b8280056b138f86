//! HTTP client for webhook delivery.
//!
//! Handles request construction, response observation, and the transport
//! error classification the retry loop depends on.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// Configuration for the webhook client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout covering connect and response.
    pub timeout: Duration,
    /// User agent string for outgoing requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), user_agent: "Conveyor-Webhook/1.0".to_string() }
    }
}

/// Observed result of one webhook POST.
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    /// HTTP status code returned by the receiver.
    pub status_code: u16,
    /// Wall-clock duration of the exchange.
    pub duration: Duration,
}

impl CallbackResponse {
    /// Whether this response terminates delivery.
    ///
    /// Anything below 500 counts: a 4xx means the receiver saw the request
    /// and rejected it, which is delivered as far as this system is
    /// concerned. Only 5xx responses are worth retrying.
    pub fn is_terminal(&self) -> bool {
        self.status_code < 500
    }
}

/// Webhook POST client with timeout and error classification.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl CallbackClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Network` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DeliveryError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// POSTs the JSON payload to the callback URL.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Timeout` when the request exceeds the configured
    ///   timeout
    /// - `DeliveryError::Network` for connection, DNS, or protocol failures
    ///
    /// A response of any status is returned as `Ok`; classifying the status
    /// is the caller's concern.
    pub async fn post(&self, url: &str, payload: &JsonValue) -> Result<CallbackResponse> {
        let start = std::time::Instant::now();

        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "callback request failed");
                if e.is_timeout() {
                    return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                }
                if e.is_connect() {
                    return Err(DeliveryError::network(format!("connection failed: {e}")));
                }
                return Err(DeliveryError::network(e.to_string()));
            },
        };

        let status_code = response.status().as_u16();
        let duration = start.elapsed();

        debug!(url, status = status_code, duration_ms = duration.as_millis() as u64, "callback response");

        Ok(CallbackResponse { status_code, duration })
    }
}
