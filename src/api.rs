//! HTTP API — thin shell over the job coordinator.
//!
//! Endpoints:
//!   POST /clips                 → submit a clip request (JSON)
//!   GET  /clips/{clip_id}       → job snapshot (JSON)
//!   GET  /cameras               → known camera ids
//!   GET  /health                → liveness
//!   GET  /status                → metrics snapshot (JSON)
//!   GET  /metrics               → Prometheus text exposition
//!   GET  /videos/{file}         → assembled clips

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::jobs::ClipRequest;
use crate::manager::JobCoordinator;
use crate::metrics::ClipMetrics;
use crate::storage::SegmentSource;

/// Shared state passed to all handlers.
pub struct AppState {
    pub coordinator: JobCoordinator,
    pub source: Arc<dyn SegmentSource>,
    pub metrics: Arc<ClipMetrics>,
    pub prometheus: Option<PrometheusHandle>,
    pub videos_dir: PathBuf,
    pub lead: chrono::Duration,
    pub trail: chrono::Duration,
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let videos = ServeDir::new(&state.videos_dir);
    Router::new()
        .route("/clips", post(handle_create_clip))
        .route("/clips/{clip_id}", get(handle_get_clip))
        .route("/cameras", get(handle_cameras))
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/metrics", get(handle_metrics))
        .nest_service("/videos", videos)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<AppState>, port: u16) {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!(port, "HTTP API listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}

async fn handle_create_clip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClipRequest>,
) -> Response {
    info!(camera = request.camera_id, "Received clip request");

    let (from, to) = request.window(state.lead, state.trail);

    // Reject early when nothing is recorded for the window.
    let source = state.source.clone();
    let camera_id = request.camera_id.clone();
    let found = tokio::task::spawn_blocking(move || source.find_overlapping(&camera_id, from, to)).await;
    match found {
        Ok(Ok(clips)) if !clips.is_empty() => {}
        Ok(Ok(_)) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "detail": format!("No video clips found for camera {} in specified time range", request.camera_id)
                })),
            )
                .into_response();
        }
        Ok(Err(e)) => return internal_error("api_error", &state, &e.to_string()),
        Err(e) => return internal_error("api_error", &state, &e.to_string()),
    }

    match state.coordinator.submit(request) {
        Ok(clip_id) => (
            StatusCode::OK,
            Json(json!({
                "clip_id": clip_id,
                "status": "pending",
                "message": "Clip request submitted successfully",
            })),
        )
            .into_response(),
        Err(e) => internal_error("api_error", &state, &e.to_string()),
    }
}

async fn handle_get_clip(State(state): State<Arc<AppState>>, Path(clip_id): Path<String>) -> Response {
    match state.coordinator.get(&clip_id) {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Clip not found"}))).into_response(),
    }
}

async fn handle_cameras(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let source = state.source.clone();
    match tokio::task::spawn_blocking(move || source.camera_ids()).await {
        Ok(cameras) => (StatusCode::OK, Json(json!({ "cameras": cameras }))).into_response(),
        Err(e) => internal_error("api_error", &state, &e.to_string()),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "metrics": state.metrics.snapshot(),
        "jobs": state.coordinator.job_count(),
        "queue_depth": state.coordinator.queue_depth(),
    }))
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::OK, Json(state.metrics.snapshot())).into_response(),
    }
}

fn internal_error(kind: &str, state: &AppState, detail: &str) -> Response {
    error!(error = detail, "Request failed");
    state.metrics.record_error(kind);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "Internal server error"}))).into_response()
}
