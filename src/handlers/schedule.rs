//! Deduction schedule and reconciliation handlers

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::Period;
use crate::schedule::{
    read_actuals_csv, write_period_report_csv, DeductionSchedule, ReconciliationReport,
    UploadSummary,
};
use crate::state::AppState;

/// Deduction report for a period, one row per loan instalment due.
pub async fn get_period_schedule(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
) -> ApiResult<Json<Vec<DeductionSchedule>>> {
    let rows = app_state.schedules.period_report(period).await?;
    Ok(Json(rows))
}

/// The same report as a CSV download for the payroll system.
pub async fn download_period_schedule(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
) -> ApiResult<(HeaderMap, String)> {
    let rows = app_state.schedules.period_report(period).await?;
    let csv = write_period_report_csv(&rows)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename=\"deductions-{}.csv\"",
            period
        ))
        .unwrap_or(HeaderValue::from_static("attachment")),
    );

    Ok((headers, csv))
}

/// Materialize any missing schedules, then return the period report. The
/// whole operation is idempotent.
pub async fn generate_period_schedule(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
) -> ApiResult<Json<Vec<DeductionSchedule>>> {
    app_state.schedules.backfill_active_loans().await?;
    let rows = app_state.schedules.period_report(period).await?;
    Ok(Json(rows))
}

/// Upload the actual deductions received from payroll for one period.
/// Re-uploading the same file is a no-op per row.
pub async fn upload_actuals(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
    body: String,
) -> ApiResult<Json<UploadSummary>> {
    let rows = read_actuals_csv(body.as_bytes())?;
    if let Some((loan_id, row_period, _, _)) = rows.iter().find(|(_, p, _, _)| *p != period) {
        return Err(crate::error::ApiError::Validation(format!(
            "Row for loan {} is for period {}, expected {}",
            loan_id, row_period, period
        )));
    }
    let summary = app_state.schedules.record_actuals(rows).await?;
    Ok(Json(summary))
}

/// Reconcile a period. Safe to repeat: verdicts are overwritten from the
/// full data each run.
pub async fn reconcile_period(
    State(app_state): State<AppState>,
    Path(period): Path<Period>,
) -> ApiResult<Json<ReconciliationReport>> {
    let (report, events) = app_state.schedules.reconcile(period).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(report))
}

/// Full amortization schedule of one loan.
pub async fn get_loan_schedule(
    State(app_state): State<AppState>,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeductionSchedule>>> {
    // Surface a 404 for unknown loans rather than an empty schedule
    app_state.registrar.get(loan_id).await?;
    let rows = app_state.schedules.list_for_loan(loan_id).await?;
    Ok(Json(rows))
}
