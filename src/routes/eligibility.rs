//! Eligibility route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn eligibility_routes() -> Router<AppState> {
    Router::new().route(
        "/loans/eligibility",
        axum::routing::post(check_eligibility),
    )
}
