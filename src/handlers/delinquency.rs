//! Delinquency handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::delinquency::DelinquencyRecord;
use crate::error::ApiResult;
use crate::register::LoanRegister;
use crate::state::AppState;

/// Loans currently at or above the watch level.
pub async fn get_delinquency_watchlist(
    State(app_state): State<AppState>,
) -> ApiResult<Json<Vec<LoanRegister>>> {
    let loans = app_state.delinquency.watchlist().await?;
    Ok(Json(loans))
}

pub async fn get_delinquency_history(
    State(app_state): State<AppState>,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DelinquencyRecord>>> {
    app_state.registrar.get(loan_id).await?;
    let records = app_state.delinquency.history(loan_id).await?;
    Ok(Json(records))
}

/// Trigger an out-of-band scan. The daily job runs the same code path.
pub async fn run_delinquency_scan(
    State(app_state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let events = app_state
        .delinquency
        .scan(Utc::now().date_naive())
        .await?;
    let escalations = events.len();
    app_state.notifier.publish_detached(events);
    Ok(Json(serde_json::json!({ "escalations": escalations })))
}
