//! Committee route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn committee_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/loans/committee/assignments",
            axum::routing::post(assign_reviewer),
        )
        .route("/loans/committee/reviews", axum::routing::post(submit_review))
        .route(
            "/loans/committee/:application_id",
            axum::routing::get(get_committee_status),
        )
}
