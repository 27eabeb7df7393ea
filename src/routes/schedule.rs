//! Deduction schedule route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn schedule_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/loans/deductions/schedule/:period",
            axum::routing::get(get_period_schedule),
        )
        .route(
            "/loans/deductions/schedule/:period/generate",
            axum::routing::post(generate_period_schedule),
        )
        .route(
            "/loans/deductions/schedule/:period/download",
            axum::routing::get(download_period_schedule),
        )
        .route(
            "/loans/deductions/actual/:period/upload",
            axum::routing::post(upload_actuals),
        )
        .route(
            "/loans/deductions/reconcile/:period",
            axum::routing::post(reconcile_period),
        )
        .route(
            "/loans/:id/schedule",
            axum::routing::get(get_loan_schedule),
        )
}
