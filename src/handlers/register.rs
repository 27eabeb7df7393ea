//! Loan registration handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::Period;
use crate::register::{LoanRegister, RegisterLoanRequest, RegistrationOutcome};
use crate::state::AppState;

/// Register an approved application against the current period's capacity.
/// Idempotent: repeating the call returns the existing entry.
pub async fn register_loan(
    State(app_state): State<AppState>,
    Json(request): Json<RegisterLoanRequest>,
) -> ApiResult<Json<RegistrationOutcome>> {
    let period = Period::from_date(Utc::now().date_naive());
    let (outcome, events) = app_state
        .registrar
        .register(request.application_id, period)
        .await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(outcome))
}

pub async fn get_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanRegister>> {
    let loan = app_state.registrar.get(id).await?;
    Ok(Json(loan))
}

pub async fn list_loans(
    State(app_state): State<AppState>,
) -> ApiResult<Json<Vec<LoanRegister>>> {
    let loans = app_state.registrar.list_active().await?;
    Ok(Json(loans))
}

/// Mark a loan disbursed. Cancellation is refused past this point.
pub async fn disburse_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanRegister>> {
    let loan = app_state.registrar.mark_disbursed(id).await?;
    Ok(Json(loan))
}

/// Cancel before disbursement, releasing the capacity back to the period.
pub async fn cancel_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanRegister>> {
    let (loan, events) = app_state.registrar.cancel(id).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(loan))
}
