//! Loan register route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn register_routes() -> Router<AppState> {
    Router::new()
        .route("/loans/register", axum::routing::post(register_loan))
        .route("/loans", axum::routing::get(list_loans))
        .route("/loans/:id", axum::routing::get(get_loan))
        .route("/loans/:id/cancel", axum::routing::post(cancel_loan))
        .route("/loans/:id/disburse", axum::routing::post(disburse_loan))
}
