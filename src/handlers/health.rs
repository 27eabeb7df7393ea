//! Root and health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::db;
use crate::state::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "coopcredit",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check with database connectivity.
pub async fn health_check(State(app_state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::check_health(&app_state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "disconnected" })),
            )
        }
    }
}
