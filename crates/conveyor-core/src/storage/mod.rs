//! Database access layer implementing the repository pattern.
//!
//! The repositories translate between domain models and the SQLite schema.
//! All database operations go through here; the pipeline crates never issue
//! SQL of their own. The job store and attempt log are the only communication
//! channel between admission, the worker, and the delivery engine.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod attempts;
pub mod jobs;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for job rows.
    pub jobs: Arc<jobs::Repository>,

    /// Repository for the append-only delivery attempt log.
    pub attempts: Arc<attempts::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        let pool = Arc::new(pool);

        Self {
            jobs: Arc::new(jobs::Repository::new(pool.clone())),
            attempts: Arc::new(attempts::Repository::new(pool)),
        }
    }

    /// Creates the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if any DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.jobs.pool();

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                input_payload TEXT NOT NULL,
                result_payload TEXT,
                callback_url TEXT,
                callback_status TEXT,
                callback_attempts INTEGER NOT NULL DEFAULT 0,
                idempotency_key TEXT UNIQUE,
                queue_position INTEGER UNIQUE,
                created_at TEXT NOT NULL,
                completed_at TEXT
            )
            ",
        )
        .execute(&*pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS delivery_attempts (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                attempt_number INTEGER NOT NULL,
                status_code INTEGER,
                success INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                response_time_ms INTEGER,
                attempted_at TEXT NOT NULL,
                UNIQUE(job_id, attempt_number)
            )
            ",
        )
        .execute(&*pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS ix_jobs_status ON jobs(status)")
            .execute(&*pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ix_delivery_attempts_job_id ON delivery_attempts(job_id)",
        )
        .execute(&*pool)
        .await?;

        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.jobs.pool()).await?;

        Ok(())
    }
}
