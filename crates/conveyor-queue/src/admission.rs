//! Admission gateway: validation, idempotency, and FIFO position assignment.
//!
//! Admissions run concurrently and serialize on exactly one thing: the
//! critical section in which a job gets its queue position and enters the
//! queue. Idempotency is a lookup first and a UNIQUE constraint as the
//! backstop: losing the race to another insert still produces a duplicate
//! response rather than a second job.

use std::sync::Arc;

use conveyor_core::{Clock, CoreError, Job, JobId, Storage};
use conveyor_report::{GeneratorError, ReportGenerator};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{info, warn};

use crate::scheduler::Scheduler;

/// Largest `num_transactions` the sync path accepts; bigger jobs must go
/// through the queue so they cannot hold an HTTP request open indefinitely.
pub const SYNC_TRANSACTION_LIMIT: u64 = 50;

/// Errors surfaced to the admission caller.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Async submissions must carry a callback destination.
    #[error("callback_url is required for async requests")]
    MissingCallbackUrl,

    /// Sync submissions above the inline limit are rejected.
    #[error("sync requests are limited to {limit} transactions, use the async endpoint")]
    SyncLimitExceeded {
        /// The configured inline limit.
        limit: u64,
    },

    /// Inline report generation failed.
    #[error("report generation failed: {0}")]
    Generator(String),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] CoreError),

    /// The scheduler has shut down and accepts no new work.
    #[error("queue is shut down")]
    QueueClosed,
}

/// Result of an async submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new job was admitted and enqueued.
    Accepted {
        /// Identifier of the new job.
        job_id: JobId,
        /// FIFO position assigned at admission.
        queue_position: i64,
    },
    /// The idempotency key is already bound to an earlier job.
    Duplicate {
        /// Identifier of the existing job.
        job_id: JobId,
    },
}

/// Result of a sync submission.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The report was generated inline.
    Completed {
        /// The persisted job after completion.
        job: Box<Job>,
        /// The generator result payload.
        result: JsonValue,
    },
    /// The idempotency key is already bound to an earlier job.
    Duplicate {
        /// Identifier of the existing job.
        job_id: JobId,
    },
}

/// Validates submissions and hands accepted jobs to the scheduler.
pub struct Admission {
    storage: Storage,
    scheduler: Arc<Scheduler>,
    generator: Arc<ReportGenerator>,
    clock: Arc<dyn Clock>,
    /// Serializes position assignment with queue insertion. Without it two
    /// concurrent admissions could enqueue in the opposite order of their
    /// assigned positions, breaking the FIFO guarantee.
    order: tokio::sync::Mutex<()>,
}

impl Admission {
    /// Creates the admission gateway.
    pub fn new(
        storage: Storage,
        scheduler: Arc<Scheduler>,
        generator: Arc<ReportGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, scheduler, generator, clock, order: tokio::sync::Mutex::new(()) }
    }

    /// Admits an async job: validate, dedup, persist with a FIFO position,
    /// enqueue, return immediately.
    ///
    /// # Errors
    ///
    /// Returns `MissingCallbackUrl` before any row is written, `Storage` on
    /// database failure, `QueueClosed` after shutdown.
    pub async fn submit(
        &self,
        payload: JsonValue,
        callback_url: &str,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitOutcome, AdmissionError> {
        if callback_url.trim().is_empty() {
            return Err(AdmissionError::MissingCallbackUrl);
        }

        if let Some(existing) = self.find_duplicate(idempotency_key).await? {
            return Ok(SubmitOutcome::Duplicate { job_id: existing });
        }

        // Critical section defining FIFO order: the insert that assigns the
        // position and the enqueue must not interleave across admissions.
        let _order = self.order.lock().await;

        let job_id = JobId::new();
        let job = match self
            .storage
            .jobs
            .create_queued(job_id, &payload, callback_url, idempotency_key, self.clock.now_utc())
            .await
        {
            Ok(job) => job,
            Err(err) if err.is_unique_violation() => {
                // Lost the idempotency race to a concurrent admission.
                if let Some(existing) = self.find_duplicate(idempotency_key).await? {
                    return Ok(SubmitOutcome::Duplicate { job_id: existing });
                }
                return Err(err.into());
            },
            Err(err) => return Err(err.into()),
        };

        let queue_position = job.queue_position.unwrap_or_default();

        self.scheduler.enqueue(job_id).map_err(|_| AdmissionError::QueueClosed)?;
        info!(job_id = %job_id, queue_position, "async job admitted");

        Ok(SubmitOutcome::Accepted { job_id, queue_position })
    }

    /// Runs a small job inline: persist, generate, resolve, return the result.
    ///
    /// Sync jobs never receive a queue position and never deliver callbacks.
    ///
    /// # Errors
    ///
    /// Returns `SyncLimitExceeded` for oversized payloads, `Generator` when
    /// generation fails (the job is left FAILED with the captured error).
    pub async fn submit_sync(
        &self,
        payload: JsonValue,
        idempotency_key: Option<&str>,
    ) -> Result<SyncOutcome, AdmissionError> {
        let requested = payload.get("num_transactions").and_then(JsonValue::as_u64);
        if requested.is_some_and(|n| n > SYNC_TRANSACTION_LIMIT) {
            return Err(AdmissionError::SyncLimitExceeded { limit: SYNC_TRANSACTION_LIMIT });
        }

        if let Some(existing) = self.find_duplicate(idempotency_key).await? {
            return Ok(SyncOutcome::Duplicate { job_id: existing });
        }

        let job_id = JobId::new();
        let created = self
            .storage
            .jobs
            .create_unqueued(job_id, &payload, idempotency_key, self.clock.now_utc())
            .await;
        if let Err(err) = created {
            if err.is_unique_violation() {
                if let Some(existing) = self.find_duplicate(idempotency_key).await? {
                    return Ok(SyncOutcome::Duplicate { job_id: existing });
                }
            }
            return Err(err.into());
        }

        self.storage.jobs.mark_processing(job_id).await?;

        let generator = self.generator.clone();
        let input = payload.clone();
        let generated: Result<JsonValue, GeneratorError> =
            match tokio::task::spawn_blocking(move || generator.generate(&input)).await {
                Ok(result) => result,
                Err(join_error) => {
                    let message = format!("report generation panicked: {join_error}");
                    self.storage.jobs.mark_failed(job_id, &json!({ "error": message })).await?;
                    return Err(AdmissionError::Generator(message));
                },
            };

        match generated {
            Ok(result) => {
                self.storage.jobs.mark_completed(job_id, &result, self.clock.now_utc()).await?;
                info!(job_id = %job_id, "sync job completed");

                let job = self
                    .storage
                    .jobs
                    .find(job_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("job {job_id} vanished")))?;

                Ok(SyncOutcome::Completed { job: Box::new(job), result })
            },
            Err(error) => {
                warn!(job_id = %job_id, error = %error, "sync report generation failed");
                self.storage
                    .jobs
                    .mark_failed(job_id, &json!({ "error": error.to_string() }))
                    .await?;
                Err(AdmissionError::Generator(error.to_string()))
            },
        }
    }

    async fn find_duplicate(
        &self,
        idempotency_key: Option<&str>,
    ) -> Result<Option<JobId>, AdmissionError> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };

        match self.storage.jobs.find_by_idempotency_key(key).await? {
            Some(existing) => {
                info!(job_id = %existing.id, idempotency_key = key, "duplicate submission");
                Ok(Some(existing.id))
            },
            None => Ok(None),
        }
    }
}
