//! HTTP server assembly.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{handlers, state::AppState};

/// Builds the service router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/sync", post(handlers::submit::submit_sync))
        .route("/api/async", post(handlers::submit::submit_async))
        .route(
            "/api/requests",
            get(handlers::requests::list_requests)
                .delete(handlers::requests::delete_all_requests),
        )
        .route(
            "/api/requests/{id}",
            get(handlers::requests::get_request).delete(handlers::requests::delete_request),
        )
        .route("/api/requests/{id}/callback-logs", get(handlers::requests::get_callback_logs))
        .route("/api/queue/status", get(handlers::queue::queue_status))
        .route("/api/callbacks/receive", post(handlers::receiver::receive_callback))
        .route(
            "/api/callbacks/history",
            get(handlers::receiver::callback_history)
                .delete(handlers::receiver::clear_callback_history),
        )
        .route(
            "/api/callbacks/simulate-failures",
            get(handlers::receiver::failure_simulation)
                .post(handlers::receiver::configure_failure_simulation),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener and serves until the shutdown future resolves.
///
/// # Errors
///
/// Returns error if binding or serving fails.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener =
        tokio::net::TcpListener::bind(addr).await.context("failed to bind server address")?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server failed")
}
