//! Queue introspection.

use axum::{extract::State, Json};
use conveyor_queue::QueueStatus;

use crate::{error::ApiError, state::AppState};

/// Reports queue depth, pending jobs, and worker liveness.
pub async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, ApiError> {
    let status = state.scheduler.status().await?;

    Ok(Json(status))
}
