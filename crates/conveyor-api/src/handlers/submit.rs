//! Admission endpoints.
//!
//! `POST /api/async` admits a job for queued processing and returns
//! immediately; `POST /api/sync` runs a small job inline. Both honor the
//! `X-Idempotency-Key` header for at-most-once admission per key.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use conveyor_queue::{SubmitOutcome, SyncOutcome};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::instrument;

use crate::{error::ApiError, state::AppState};

/// Request body for async admission.
#[derive(Debug, Deserialize)]
pub struct AsyncRequestBody {
    /// Payload handed to the report generator.
    pub payload: JsonValue,
    /// Webhook destination for the completion notification.
    #[serde(default)]
    pub callback_url: String,
}

/// Request body for sync admission.
#[derive(Debug, Deserialize)]
pub struct SyncRequestBody {
    /// Payload handed to the report generator.
    pub payload: JsonValue,
}

/// Admits an async job. Responds 202 with the assigned queue position.
#[instrument(name = "submit_async", skip(state, headers, body))]
pub async fn submit_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AsyncRequestBody>,
) -> Result<Response, ApiError> {
    let idempotency_key = idempotency_key(&headers);

    let outcome =
        state.admission.submit(body.payload, &body.callback_url, idempotency_key.as_deref()).await?;

    let response = match outcome {
        SubmitOutcome::Accepted { job_id, queue_position } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "request_id": job_id.to_string(),
                "status": "pending",
                "queue_position": queue_position,
                "message": format!(
                    "Report generation queued at position #{queue_position}. \
                     We will call you back at {}",
                    body.callback_url
                ),
            })),
        ),
        SubmitOutcome::Duplicate { job_id } => (
            StatusCode::OK,
            Json(json!({
                "status": "duplicate",
                "request_id": job_id.to_string(),
                "message": "Request with this idempotency key already exists",
            })),
        ),
    };

    Ok(response.into_response())
}

/// Runs a small job inline and responds with the flattened result.
#[instrument(name = "submit_sync", skip(state, headers, body))]
pub async fn submit_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SyncRequestBody>,
) -> Result<Response, ApiError> {
    let idempotency_key = idempotency_key(&headers);

    let outcome = state.admission.submit_sync(body.payload, idempotency_key.as_deref()).await?;

    let response = match outcome {
        SyncOutcome::Completed { job, result } => {
            let mut response_body = serde_json::Map::new();
            response_body.insert("request_id".to_string(), json!(job.id.to_string()));
            response_body.insert("mode".to_string(), json!("sync"));
            response_body.insert("status".to_string(), json!("completed"));
            if let Some(fields) = result.as_object() {
                for (key, value) in fields {
                    response_body.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            (StatusCode::OK, Json(JsonValue::Object(response_body)))
        },
        SyncOutcome::Duplicate { job_id } => {
            let original = state.storage.jobs.find(job_id).await?;
            (
                StatusCode::OK,
                Json(json!({
                    "status": "duplicate",
                    "request_id": job_id.to_string(),
                    "message": "Request with this idempotency key already exists",
                    "original_result": original.and_then(|job| job.result().cloned()),
                })),
            )
        },
    };

    Ok(response.into_response())
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-idempotency-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
