//! Test harness for conveyor integration and unit tests.
//!
//! Provides a disposable SQLite database, an HTTP mock server for webhook
//! receivers, and polling helpers for asserting on asynchronous state.

use std::{future::Future, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use conveyor_core::Storage;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

/// Test environment with storage and HTTP mocking ready to use.
///
/// Each environment owns its database file inside a temp directory that is
/// removed on drop, so tests are fully isolated from each other.
pub struct TestEnv {
    /// Connection pool for direct SQL in assertions.
    pub pool: SqlitePool,

    /// Repositories over the same pool.
    pub storage: Storage,

    /// Mock webhook receiver.
    pub http_mock: MockServer,

    /// Directory for generated report files.
    pub reports_dir: PathBuf,

    _tempdir: tempfile::TempDir,
}

impl TestEnv {
    /// Creates a fresh environment: temp database, migrated schema, mock
    /// server.
    pub async fn new() -> Result<Self> {
        init_tracing();

        let tempdir = tempfile::tempdir().context("failed to create temp dir")?;
        let db_path = tempdir.path().join("conveyor-test.db");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open test database")?;

        let storage = Storage::new(pool.clone());
        storage.migrate().await.context("failed to migrate test database")?;

        let http_mock = MockServer::start().await;
        let reports_dir = tempdir.path().join("reports");

        Ok(Self { pool, storage, http_mock, reports_dir, _tempdir: tempdir })
    }

    /// Storage handle for repositories.
    pub fn storage(&self) -> Storage {
        self.storage.clone()
    }

    /// Base URI of the mock webhook receiver.
    pub fn mock_uri(&self) -> String {
        self.http_mock.uri()
    }

    /// Full URL of a path on the mock webhook receiver.
    pub fn mock_url(&self, path: &str) -> String {
        format!("{}{path}", self.http_mock.uri())
    }
}

/// Polls an async condition until it holds or the timeout expires.
///
/// Returns `Ok(())` on success, an error naming the condition on timeout.
pub async fn wait_until<F, Fut>(description: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = std::time::Instant::now() + timeout;

    loop {
        if condition().await? {
            return Ok(());
        }
        if std::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for: {description}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,conveyor=debug")),
        )
        .with_test_writer()
        .try_init();
}
