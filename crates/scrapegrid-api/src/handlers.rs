//! API handlers.
//!
//! Handlers only read the last published snapshot and the live config;
//! nothing here talks to shards.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::warn;

use scrapegrid_core::ApiResponse;

use crate::ApiState;
use crate::listing::{PromResponse, TargetsQuery, build_listing};

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (status, Json(ApiResponse::<()>::err(msg)))
}

/// GET /api/v1/targets
pub async fn list_targets(
    State(state): State<ApiState>,
    Query(query): Query<TargetsQuery>,
) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();
    Json(PromResponse::success(build_listing(&snapshot, query.state)))
}

#[derive(Debug, Serialize)]
struct ConfigView {
    config: String,
    hash: String,
}

/// GET /api/v1/status/config
pub async fn get_config(State(state): State<ApiState>) -> impl IntoResponse {
    let current = state.reloader.store().current();
    Json(ApiResponse::ok(ConfigView {
        config: String::from_utf8_lossy(&current.raw).into_owned(),
        hash: current.hash.clone(),
    }))
}

/// GET /api/v1/shards
pub async fn list_shards(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();
    Json(ApiResponse::ok(snapshot.shards.clone()))
}

/// POST /-/reload
///
/// The file is read and parsed on the blocking pool.
pub async fn reload(State(state): State<ApiState>) -> impl IntoResponse {
    let reloader = state.reloader.clone();
    let result = match tokio::task::spawn_blocking(move || reloader.reload()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("reload task failed: {e}")),
    };

    match result {
        Ok(loaded) => Json(ApiResponse::ok(serde_json::json!({ "hash": loaded.hash }))).into_response(),
        Err(e) => {
            warn!(error = %e, "reload rejected");
            error_response(&e, StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();
    let body = crate::prometheus::render_prometheus(&snapshot, &state.coordinator.explorer().job_stats());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
