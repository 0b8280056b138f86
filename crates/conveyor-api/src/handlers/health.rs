//! Liveness probe.

use axum::{extract::State, Json};
use serde_json::{json, Value as JsonValue};

use crate::{error::ApiError, state::AppState};

/// Reports process liveness and database reachability.
pub async fn health(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    state.storage.health_check().await?;

    Ok(Json(json!({ "status": "ok" })))
}
