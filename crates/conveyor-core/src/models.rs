//! Core domain models and strongly-typed identifiers.
//!
//! Defines jobs, delivery attempts, and newtype ID wrappers for compile-time
//! type safety. Includes database serialization traits and the state
//! transition vocabulary for the admission/delivery pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

type Db = sqlx::Sqlite;
type SqliteTypeInfo = sqlx::sqlite::SqliteTypeInfo;
type SqliteValueRef<'r> = sqlx::sqlite::SqliteValueRef<'r>;
type ArgumentBuffer<'q> = <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>;
type EncodeResult = Result<sqlx::encode::IsNull, sqlx::error::BoxDynError>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed job identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. A job keeps this ID
/// through its entire lifecycle; callers see it as `request_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl sqlx::Type<Db> for JobId {
    fn type_info() -> SqliteTypeInfo {
        <String as sqlx::Type<Db>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Db> for JobId {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<Db>>::decode(value)?;
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl<'q> sqlx::Encode<'q, Db> for JobId {
    fn encode_by_ref(&self, buf: &mut ArgumentBuffer<'q>) -> EncodeResult {
        <String as sqlx::Encode<Db>>::encode(self.0.to_string(), buf)
    }
}

/// Strongly-typed delivery attempt identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Creates a new random attempt ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<Db> for AttemptId {
    fn type_info() -> SqliteTypeInfo {
        <String as sqlx::Type<Db>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Db> for AttemptId {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<Db>>::decode(value)?;
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl<'q> sqlx::Encode<'q, Db> for AttemptId {
    fn encode_by_ref(&self, buf: &mut ArgumentBuffer<'q>) -> EncodeResult {
        <String as sqlx::Encode<Db>>::encode(self.0.to_string(), buf)
    }
}

/// Execution mode chosen at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// Executed inline during admission; the caller blocks for the result.
    Sync,
    /// Queued for the background worker; completion reported via webhook.
    Async,
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

impl std::str::FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(format!("invalid job mode: {other}")),
        }
    }
}

impl sqlx::Type<Db> for JobMode {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Db>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Db> for JobMode {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<Db>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, Db> for JobMode {
    fn encode_by_ref(&self, buf: &mut ArgumentBuffer<'q>) -> EncodeResult {
        <String as sqlx::Encode<Db>>::encode(self.to_string(), buf)
    }
}

/// Job lifecycle status.
///
/// Transitions are strictly one-way:
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED
///                       -> FAILED
/// ```
///
/// COMPLETED and FAILED are terminal and never revisited. The repository
/// layer guards every transition in SQL so a stale writer cannot resurrect a
/// terminal job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Admitted and waiting in the FIFO queue.
    Pending,
    /// Claimed by the worker; report generation in progress.
    Processing,
    /// Report generated successfully. Terminal.
    Completed,
    /// Report generation failed; the error is captured in `result_payload`.
    /// Terminal.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl JobStatus {
    /// Whether this status can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("invalid job status: {other}")),
        }
    }
}

impl sqlx::Type<Db> for JobStatus {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Db>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Db> for JobStatus {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<Db>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, Db> for JobStatus {
    fn encode_by_ref(&self, buf: &mut ArgumentBuffer<'q>) -> EncodeResult {
        <String as sqlx::Encode<Db>>::encode(self.to_string(), buf)
    }
}

/// Outcome of webhook delivery for a job.
///
/// Only meaningful when a callback URL is present. Set once, after the job
/// itself reaches a terminal status: PENDING -> SUCCESS or PENDING -> FAILED.
/// Orthogonal to `JobStatus` — a COMPLETED job can carry a FAILED callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackStatus {
    /// Delivery not yet attempted.
    Pending,
    /// Receiver acknowledged (any HTTP status below 500).
    Success,
    /// Blocked by the URL guard or retries exhausted.
    Failed,
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for CallbackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("invalid callback status: {other}")),
        }
    }
}

impl sqlx::Type<Db> for CallbackStatus {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Db>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Db> for CallbackStatus {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<Db>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, Db> for CallbackStatus {
    fn encode_by_ref(&self, buf: &mut ArgumentBuffer<'q>) -> EncodeResult {
        <String as sqlx::Encode<Db>>::encode(self.to_string(), buf)
    }
}

/// A submitted unit of work and its outcome.
///
/// Created by admission, mutated by the worker (status, result) and the
/// delivery engine (callback fields). Never deleted by the pipeline itself.
///
/// `queue_position` is the canonical FIFO ordering key: assigned exactly once
/// at admission, unique among queued jobs, monotonically increasing in
/// arrival order. Sync jobs never receive one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    /// Unique identifier, exposed to callers as `request_id`.
    pub id: JobId,

    /// Whether the job ran inline or through the queue.
    pub mode: JobMode,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Caller-supplied payload, opaque to the pipeline.
    pub input_payload: sqlx::types::Json<JsonValue>,

    /// Generator output on success, `{"error": ...}` on failure.
    pub result_payload: Option<sqlx::types::Json<JsonValue>>,

    /// Webhook destination. Required for async jobs, absent for sync.
    pub callback_url: Option<String>,

    /// Delivery outcome; only meaningful when `callback_url` is set.
    pub callback_status: Option<CallbackStatus>,

    /// Number of delivery attempts made so far.
    pub callback_attempts: i64,

    /// Caller-supplied dedup token, globally unique when present.
    pub idempotency_key: Option<String>,

    /// FIFO ordering key; set only for queued jobs.
    pub queue_position: Option<i64>,

    /// When the job was admitted.
    pub created_at: DateTime<Utc>,

    /// When the report was generated (terminal success only).
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The caller-supplied input payload.
    pub fn input(&self) -> &JsonValue {
        &self.input_payload.0
    }

    /// The result payload, if the job has produced one.
    pub fn result(&self) -> Option<&JsonValue> {
        self.result_payload.as_ref().map(|j| &j.0)
    }
}

/// One logged webhook delivery attempt.
///
/// Append-only audit record: attempts are never updated, deleted, or
/// reordered. `attempt_number` is 1-based and strictly sequential per job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attempt {
    /// Unique identifier for this attempt.
    pub id: AttemptId,

    /// Job this attempt belongs to.
    pub job_id: JobId,

    /// Sequential attempt number, starting at 1.
    pub attempt_number: i64,

    /// HTTP status received; None when the request never produced a response.
    pub status_code: Option<i64>,

    /// Whether the attempt terminated delivery successfully.
    pub success: bool,

    /// Transport or server error description on failure.
    pub error_message: Option<String>,

    /// Wall-clock duration of the HTTP exchange.
    pub response_time_ms: Option<i64>,

    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

/// Attempt data as produced by the delivery engine, before it gets an ID.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    /// Job this attempt belongs to.
    pub job_id: JobId,
    /// Sequential attempt number, starting at 1.
    pub attempt_number: i64,
    /// HTTP status received, if the request produced a response.
    pub status_code: Option<i64>,
    /// Whether the attempt terminated delivery successfully.
    pub success: bool,
    /// Transport or server error description on failure.
    pub error_message: Option<String>,
    /// Wall-clock duration of the HTTP exchange.
    pub response_time_ms: Option<i64>,
    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_display_matches_stored_form() {
        assert_eq!(JobStatus::Pending.to_string(), "PENDING");
        assert_eq!(JobStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(JobStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn job_status_round_trips_through_parse() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("pending".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_statuses_identified() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn callback_status_round_trips() {
        for status in [CallbackStatus::Pending, CallbackStatus::Success, CallbackStatus::Failed] {
            let parsed: CallbackStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn job_mode_serializes_lowercase() {
        assert_eq!(JobMode::Async.to_string(), "async");
        assert_eq!(serde_json::to_string(&JobMode::Sync).unwrap(), "\"sync\"");
    }
}
