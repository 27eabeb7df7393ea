//! Application route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/loans/applications", axum::routing::post(create_application))
        .route("/loans/applications", axum::routing::get(list_applications))
        .route("/loans/applications/:id", axum::routing::get(get_application))
        .route(
            "/loans/applications/:id/submit",
            axum::routing::post(submit_application),
        )
}
