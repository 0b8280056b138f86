//! Repository for the delivery attempt log.
//!
//! The log is append-only: attempts are inserted once and never updated or
//! deleted by the pipeline. A UNIQUE(job_id, attempt_number) constraint backs
//! the no-gaps, no-duplicates invariant the delivery engine maintains.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    error::Result,
    models::{Attempt, AttemptId, JobId, NewAttempt},
};

/// Repository for delivery attempt records.
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

    /// Appends a delivery attempt to the audit log.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails, including when the attempt number
    /// is already taken for this job.
    pub async fn record(&self, attempt: &NewAttempt) -> Result<AttemptId> {
        let id = AttemptId::new();

        sqlx::query(
            r"
            INSERT INTO delivery_attempts (
                id, job_id, attempt_number, status_code, success,
                error_message, response_time_ms, attempted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(id)
        .bind(attempt.job_id)
        .bind(attempt.attempt_number)
        .bind(attempt.status_code)
        .bind(attempt.success)
        .bind(&attempt.error_message)
        .bind(attempt.response_time_ms)
        .bind(attempt.attempted_at)
        .execute(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Returns all attempts for a job in attempt order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_job(&self, job_id: JobId) -> Result<Vec<Attempt>> {
        let attempts = sqlx::query_as::<_, Attempt>(
            r"
            SELECT id, job_id, attempt_number, status_code, success,
                   error_message, response_time_ms, attempted_at
            FROM delivery_attempts
            WHERE job_id = $1
            ORDER BY attempt_number ASC
            ",
        )
        .bind(job_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(attempts)
    }

    /// Counts attempts recorded for a job.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_job(&self, job_id: JobId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_attempts WHERE job_id = $1")
                .bind(job_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }
}
