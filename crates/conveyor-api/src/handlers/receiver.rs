//! Demo webhook receiver.
//!
//! Simulates a customer's callback endpoint so the full pipeline can be
//! exercised against this process. This is the loopback path the SSRF guard
//! exempts. Failure simulation makes the retry protocol observable: when
//! enabled, a configurable percentage of callbacks answer 500.

use std::collections::VecDeque;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::info;

use crate::state::AppState;

/// Callbacks kept for inspection; older entries are dropped.
const HISTORY_LIMIT: usize = 100;

/// In-memory state of the demo receiver.
#[derive(Debug, Default)]
pub struct ReceiverState {
    history: RwLock<VecDeque<JsonValue>>,
    failure: RwLock<FailureSimulation>,
}

/// Failure injection settings for retry testing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FailureSimulation {
    /// Whether callbacks may be answered with 500.
    #[serde(default)]
    pub enabled: bool,
    /// Percentage of callbacks that fail while enabled (1-100).
    #[serde(default = "default_failure_rate")]
    pub failure_rate: u8,
}

impl Default for FailureSimulation {
    fn default() -> Self {
        Self { enabled: false, failure_rate: default_failure_rate() }
    }
}

fn default_failure_rate() -> u8 {
    100
}

/// Accepts a webhook and records it; may simulate a server error.
pub async fn receive_callback(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> Response {
    let request_id = body.get("request_id").cloned().unwrap_or(JsonValue::Null);

    {
        let mut history = state.receiver.history.write().await;
        history.push_back(body);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    let failure = *state.receiver.failure.read().await;
    if failure.enabled {
        let roll = rand::thread_rng().gen_range(1..=100);
        if roll <= i32::from(failure.failure_rate) {
            info!(%request_id, "demo receiver simulating failure");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "simulated server error" })),
            )
                .into_response();
        }
    }

    (StatusCode::OK, Json(json!({ "status": "received", "request_id": request_id })))
        .into_response()
}

/// Lists received callbacks, newest first.
pub async fn callback_history(State(state): State<AppState>) -> Json<JsonValue> {
    let history = state.receiver.history.read().await;
    let callbacks: Vec<JsonValue> = history.iter().rev().cloned().collect();

    Json(json!({ "total": callbacks.len(), "callbacks": callbacks }))
}

/// Clears the callback history.
pub async fn clear_callback_history(State(state): State<AppState>) -> Json<JsonValue> {
    state.receiver.history.write().await.clear();

    Json(json!({ "cleared": true }))
}

/// Updates the failure simulation settings.
pub async fn configure_failure_simulation(
    State(state): State<AppState>,
    Query(settings): Query<FailureSimulation>,
) -> Json<JsonValue> {
    let clamped = FailureSimulation {
        enabled: settings.enabled,
        failure_rate: settings.failure_rate.clamp(1, 100),
    };

    *state.receiver.failure.write().await = clamped;

    Json(json!({ "enabled": clamped.enabled, "failure_rate": clamped.failure_rate }))
}

/// Reports the current failure simulation settings.
pub async fn failure_simulation(State(state): State<AppState>) -> Json<JsonValue> {
    let failure = *state.receiver.failure.read().await;

    Json(json!({ "enabled": failure.enabled, "failure_rate": failure.failure_rate }))
}
