//! Inspection and management of persisted jobs.
//!
//! Plain data access over the durable schema: listing, single lookup,
//! deletion, and the per-job delivery attempt log.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use conveyor_core::{Attempt, Job, JobId, JobMode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{error::ApiError, state::AppState};

/// Query parameters for the job listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Optional mode filter: "sync" or "async".
    pub mode: Option<String>,
}

/// JSON view of a job row.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub mode: String,
    pub status: String,
    pub input_payload: JsonValue,
    pub result_payload: Option<JsonValue>,
    pub callback_url: Option<String>,
    pub callback_status: Option<String>,
    pub callback_attempts: i64,
    pub idempotency_key: Option<String>,
    pub queue_position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            mode: job.mode.to_string(),
            status: job.status.to_string(),
            input_payload: job.input_payload.0,
            result_payload: job.result_payload.map(|j| j.0),
            callback_url: job.callback_url,
            callback_status: job.callback_status.map(|s| s.to_string()),
            callback_attempts: job.callback_attempts,
            idempotency_key: job.idempotency_key,
            queue_position: job.queue_position,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// JSON view of one delivery attempt.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub attempt_number: i64,
    pub status_code: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub response_time_ms: Option<i64>,
    pub attempted_at: DateTime<Utc>,
}

impl From<Attempt> for AttemptView {
    fn from(attempt: Attempt) -> Self {
        Self {
            attempt_number: attempt.attempt_number,
            status_code: attempt.status_code,
            success: attempt.success,
            error_message: attempt.error_message,
            response_time_ms: attempt.response_time_ms,
            attempted_at: attempt.attempted_at,
        }
    }
}

/// Lists jobs newest-first, optionally filtered by mode.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<JsonValue>, ApiError> {
    let mode = match params.mode.as_deref() {
        None => None,
        Some(raw) => Some(
            raw.parse::<JobMode>()
                .map_err(|_| ApiError::BadRequest(format!("invalid mode filter: {raw}")))?,
        ),
    };

    let jobs = state.storage.jobs.list(mode).await?;
    let views: Vec<JobView> = jobs.into_iter().map(JobView::from).collect();

    Ok(Json(serde_json::json!({ "requests": views })))
}

/// Fetches a single job by ID.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job = find_job(&state, &id).await?;

    Ok(Json(JobView::from(job)))
}

/// Deletes a single job by ID.
pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let job_id = parse_job_id(&id)?;

    if !state.storage.jobs.delete(job_id).await? {
        return Err(ApiError::NotFound(format!("request {id} not found")));
    }

    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}

/// Deletes all jobs.
pub async fn delete_all_requests(
    State(state): State<AppState>,
) -> Result<Json<JsonValue>, ApiError> {
    let count = state.storage.jobs.delete_all().await?;

    Ok(Json(serde_json::json!({ "deleted": true, "count": count })))
}

/// Returns the delivery attempt log for a job, in attempt order.
pub async fn get_callback_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let job = find_job(&state, &id).await?;

    let attempts = state.storage.attempts.find_by_job(job.id).await?;
    let views: Vec<AttemptView> = attempts.into_iter().map(AttemptView::from).collect();

    Ok(Json(serde_json::json!({
        "request_id": id,
        "total_attempts": views.len(),
        "logs": views,
    })))
}

async fn find_job(state: &AppState, id: &str) -> Result<Job, ApiError> {
    let job_id = parse_job_id(id)?;

    state
        .storage
        .jobs
        .find(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("request {id} not found")))
}

fn parse_job_id(id: &str) -> Result<JobId, ApiError> {
    id.parse::<JobId>().map_err(|_| ApiError::BadRequest(format!("invalid request id: {id}")))
}
