//! HTTP route handlers.

use super::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::{Value, json};

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": format!("{} API server is running", state.server_name),
    }))
}

/// Process liveness. Always 200; the store state is informational.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = if state.supervisor.status().connected {
        "connected"
    } else {
        "disconnected"
    };
    Json(json!({
        "success": true,
        "message": "Server is healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.environment,
        "database": database,
    }))
}

/// Backing store probe. 503 unless the probe reports healthy.
pub async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.supervisor.health_check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "success": report.is_healthy(),
        "database": report,
        "timestamp": Utc::now(),
    });
    (status, Json(body))
}

pub async fn metrics() -> String {
    crate::metrics::gather_metrics()
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
