//! Repository for job rows.
//!
//! Owns every mutation of the `jobs` table. Status transitions are guarded in
//! the WHERE clause of each UPDATE so terminal states are never revisited and
//! a stale writer loses cleanly instead of corrupting the lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

use crate::{
    error::{CoreError, Result},
    models::{CallbackStatus, Job, JobId, JobMode, JobStatus},
};

const JOB_COLUMNS: &str = "id, mode, status, input_payload, result_payload, callback_url, \
                           callback_status, callback_attempts, idempotency_key, queue_position, \
                           created_at, completed_at";

/// Repository for job persistence and lifecycle transitions.
pub struct Repository {
    pool: Arc<SqlitePool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<SqlitePool> {
        self.pool.clone()
    }

    /// Inserts a PENDING async job and assigns its FIFO position.
    ///
    /// The queue position is computed inside the INSERT statement as
    /// `MAX(queue_position) + 1`, so assignment and insertion are one atomic
    /// write. SQLite serializes writers, which makes this the critical
    /// section that defines FIFO order even under concurrent admissions.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the idempotency key already exists.
    pub async fn create_queued(
        &self,
        id: JobId,
        input_payload: &JsonValue,
        callback_url: &str,
        idempotency_key: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Job> {
        let sql = format!(
            r"
            INSERT INTO jobs (
                id, mode, status, input_payload, callback_url, callback_status,
                callback_attempts, idempotency_key, queue_position, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, 0, $7,
                (SELECT COALESCE(MAX(queue_position), 0) + 1 FROM jobs),
                $8
            )
            RETURNING {JOB_COLUMNS}
            "
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(JobMode::Async)
            .bind(JobStatus::Pending)
            .bind(sqlx::types::Json(input_payload))
            .bind(callback_url)
            .bind(CallbackStatus::Pending)
            .bind(idempotency_key)
            .bind(created_at)
            .fetch_one(&*self.pool)
            .await?;

        Ok(job)
    }

    /// Inserts a sync job with no queue position and no callback.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the idempotency key already exists.
    pub async fn create_unqueued(
        &self,
        id: JobId,
        input_payload: &JsonValue,
        idempotency_key: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Job> {
        let sql = format!(
            r"
            INSERT INTO jobs (
                id, mode, status, input_payload, callback_attempts,
                idempotency_key, created_at
            ) VALUES ($1, $2, $3, $4, 0, $5, $6)
            RETURNING {JOB_COLUMNS}
            "
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(JobMode::Sync)
            .bind(JobStatus::Pending)
            .bind(sqlx::types::Json(input_payload))
            .bind(idempotency_key)
            .bind(created_at)
            .fetch_one(&*self.pool)
            .await?;

        Ok(job)
    }

    /// Finds a job by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");

        let job = sqlx::query_as::<_, Job>(&sql).bind(id).fetch_optional(&*self.pool).await?;

        Ok(job)
    }

    /// Finds the job bound to an idempotency key, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE idempotency_key = $1");

        let job = sqlx::query_as::<_, Job>(&sql).bind(key).fetch_optional(&*self.pool).await?;

        Ok(job)
    }

    /// Lists jobs newest-first, optionally filtered by mode.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self, mode: Option<JobMode>) -> Result<Vec<Job>> {
        let jobs = match mode {
            Some(mode) => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE mode = $1 ORDER BY created_at DESC"
                );
                sqlx::query_as::<_, Job>(&sql).bind(mode).fetch_all(&*self.pool).await?
            },
            None => {
                let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC");
                sqlx::query_as::<_, Job>(&sql).fetch_all(&*self.pool).await?
            },
        };

        Ok(jobs)
    }

    /// Transitions PENDING -> PROCESSING.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the job is not PENDING.
    pub async fn mark_processing(&self, id: JobId) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2 AND status = $3")
            .bind(JobStatus::Processing)
            .bind(id)
            .bind(JobStatus::Pending)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!("job {id} is not PENDING")));
        }

        Ok(())
    }

    /// Transitions PROCESSING -> COMPLETED with the generator result.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the job is not PROCESSING.
    pub async fn mark_completed(
        &self,
        id: JobId,
        result_payload: &JsonValue,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET status = $1, result_payload = $2, completed_at = $3
            WHERE id = $4 AND status = $5
            ",
        )
        .bind(JobStatus::Completed)
        .bind(sqlx::types::Json(result_payload))
        .bind(completed_at)
        .bind(id)
        .bind(JobStatus::Processing)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!("job {id} is not PROCESSING")));
        }

        Ok(())
    }

    /// Transitions a non-terminal job to FAILED with the captured error.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the job is already terminal.
    pub async fn mark_failed(&self, id: JobId, error_payload: &JsonValue) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET status = $1, result_payload = $2
            WHERE id = $3 AND status IN ($4, $5)
            ",
        )
        .bind(JobStatus::Failed)
        .bind(sqlx::types::Json(error_payload))
        .bind(id)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Processing)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!("job {id} is already terminal")));
        }

        Ok(())
    }

    /// Resolves the callback outcome: PENDING -> SUCCESS or FAILED.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the callback outcome was already set.
    pub async fn set_callback_status(&self, id: JobId, status: CallbackStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE jobs SET callback_status = $1 WHERE id = $2 AND callback_status = $3")
                .bind(status)
                .bind(id)
                .bind(CallbackStatus::Pending)
                .execute(&*self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!(
                "callback outcome for job {id} is already resolved"
            )));
        }

        Ok(())
    }

    /// Records how many delivery attempts have been made so far.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_callback_attempts(&self, id: JobId, attempts: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET callback_attempts = $1 WHERE id = $2")
            .bind(attempts)
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Counts jobs waiting in PENDING.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_pending(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = $1")
            .bind(JobStatus::Pending)
            .fetch_one(&*self.pool)
            .await?;

        Ok(count.0)
    }

    /// Deletes a job. Management operation, never called by the pipeline.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes all jobs. Management operation, never called by the pipeline.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs").execute(&*self.pool).await?;

        Ok(result.rows_affected())
    }
}
