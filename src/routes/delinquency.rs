//! Delinquency route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn delinquency_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/loans/delinquency",
            axum::routing::get(get_delinquency_watchlist),
        )
        .route(
            "/loans/delinquency/scan",
            axum::routing::post(run_delinquency_scan),
        )
        .route(
            "/loans/:id/delinquency",
            axum::routing::get(get_delinquency_history),
        )
}
