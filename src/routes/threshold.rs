//! Threshold route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn threshold_routes() -> Router<AppState> {
    Router::new()
        .route("/loans/threshold/:period", axum::routing::get(get_threshold))
        .route(
            "/loans/threshold/:period",
            axum::routing::put(adjust_threshold),
        )
}
