//! Delivery engine: bounded retries with a complete audit trail.
//!
//! One `deliver` call owns the whole callback lifecycle for a job: it counts
//! attempts, performs the HTTP POSTs, appends one audit row per attempt,
//! sleeps the scheduled backoff between retryable failures, and resolves the
//! job's callback outcome. The worker blocks on it by design; strict per-job
//! completion is the ordering guarantee of the whole pipeline.

use std::sync::Arc;

use conveyor_core::{CallbackStatus, Clock, JobId, NewAttempt, Storage};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::{
    client::{CallbackClient, ClientConfig},
    error::Result,
    retry::BackoffSchedule,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    /// HTTP client settings.
    pub client: ClientConfig,

    /// Attempt budget and inter-attempt delays.
    pub backoff: BackoffSchedule,
}

/// Performs webhook deliveries and maintains the attempt log.
pub struct DeliveryEngine {
    storage: Storage,
    client: CallbackClient,
    schedule: BackoffSchedule,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    /// Creates a delivery engine.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized.
    pub fn new(storage: Storage, config: DeliveryConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = CallbackClient::new(config.client)?;

        Ok(Self { storage, client, schedule: config.backoff, clock })
    }

    /// Delivers the payload to the callback URL with bounded retries.
    ///
    /// Returns `Ok(true)` when a terminal response (status below 500) was
    /// received, `Ok(false)` when every attempt in the budget failed
    /// retryably. Either way the job's `callback_status` is resolved and
    /// every attempt has an audit row; `attempt_number` increments by exactly
    /// one per try starting at 1.
    ///
    /// # Errors
    ///
    /// Returns error only when persisting an attempt or the callback outcome
    /// fails; HTTP failures are consumed by the retry protocol.
    pub async fn deliver(&self, job_id: JobId, url: &str, payload: &JsonValue) -> Result<bool> {
        let max_attempts = self.schedule.max_attempts();

        for attempt_number in 1..=max_attempts {
            // The attempt counter on the job row is bumped before the wire
            // call so an observer never sees fewer attempts than the log.
            self.storage.jobs.set_callback_attempts(job_id, attempt_number).await?;

            let started = std::time::Instant::now();
            let outcome = self.client.post(url, payload).await;
            let response_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

            let (status_code, error_message, terminal) = match outcome {
                Ok(response) if response.is_terminal() => {
                    (Some(i64::from(response.status_code)), None, true)
                },
                Ok(response) => (
                    Some(i64::from(response.status_code)),
                    Some(format!("server returned {}", response.status_code)),
                    false,
                ),
                Err(error) if error.is_retryable() => {
                    (error.status_code().map(i64::from), Some(error.to_string()), false)
                },
                Err(error) => return Err(error),
            };

            self.storage
                .attempts
                .record(&NewAttempt {
                    job_id,
                    attempt_number,
                    status_code,
                    success: terminal,
                    error_message: error_message.clone(),
                    response_time_ms: Some(response_time_ms),
                    attempted_at: self.clock.now_utc(),
                })
                .await?;

            if terminal {
                self.storage.jobs.set_callback_status(job_id, CallbackStatus::Success).await?;
                info!(
                    job_id = %job_id,
                    attempt = attempt_number,
                    status = status_code,
                    "callback delivered"
                );
                return Ok(true);
            }

            match self.schedule.delay_after(attempt_number) {
                Some(delay) => {
                    warn!(
                        job_id = %job_id,
                        attempt = attempt_number,
                        max_attempts,
                        error = error_message.as_deref().unwrap_or("unknown"),
                        retry_in_ms = delay.as_millis() as u64,
                        "callback attempt failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                },
                None => {
                    warn!(
                        job_id = %job_id,
                        attempt = attempt_number,
                        error = error_message.as_deref().unwrap_or("unknown"),
                        "callback attempt failed, budget exhausted"
                    );
                },
            }
        }

        self.storage.jobs.set_callback_status(job_id, CallbackStatus::Failed).await?;
        Ok(false)
    }
}
