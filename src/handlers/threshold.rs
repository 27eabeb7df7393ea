//! Monthly threshold handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::models::Period;
use crate::threshold::{AdjustThresholdRequest, MonthlyThreshold, QueueEntry};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ThresholdView {
    pub threshold: MonthlyThreshold,
    pub queue: Vec<QueueEntry>,
}

pub async fn get_threshold(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
) -> ApiResult<Json<ThresholdView>> {
    let threshold = app_state.allocator.get(period).await?;
    let queue = app_state.allocator.queued(period).await?;
    Ok(Json(ThresholdView { threshold, queue }))
}

/// Adjust a period's ceiling. Growth drains the queue; shrinking below
/// what is already allocated is refused.
pub async fn adjust_threshold(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
    Json(request): Json<AdjustThresholdRequest>,
) -> ApiResult<Json<MonthlyThreshold>> {
    let (threshold, drained) = app_state
        .allocator
        .adjust_ceiling(period, request.maximum_amount)
        .await?;

    let mut events = Vec::new();
    for admission in drained {
        let (_, mut more) = app_state
            .registrar
            .register_admitted(admission.application_id, period, admission.amount)
            .await?;
        events.append(&mut more);
    }
    app_state.notifier.publish_detached(events);

    Ok(Json(threshold))
}
