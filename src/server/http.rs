// src/server/http.rs

//! The agent's HTTP surface: liveness, Prometheus exposition and the
//! authenticated command API. Served on every replica regardless of
//! leadership.

use super::commander;
use super::initialization::AgentState;
use crate::core::metrics::gather_metrics;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the full router. Command routes sit behind the bearer-token
/// middleware; health and metrics are public.
pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(commander::routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_err: tower::BoxError| async {
                    StatusCode::REQUEST_TIMEOUT
                }))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Serves all registered metrics in the Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Runs the HTTP server until shutdown is signalled.
pub async fn run_http_server(state: Arc<AgentState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.settings.port;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(address = %addr, "Starting HTTP server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port, error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("HTTP server shutting down.");
        })
        .await
    {
        error!(error = %e, "HTTP server terminated with error");
    }
}
