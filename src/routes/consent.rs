//! Guarantor consent route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn consent_routes() -> Router<AppState> {
    Router::new()
        .route("/loans/guarantors", axum::routing::post(nominate_guarantor))
        .route(
            "/loans/guarantor-consent/:token",
            axum::routing::get(view_consent),
        )
        .route(
            "/loans/guarantor-consent/:token",
            axum::routing::post(respond_to_consent),
        )
        .route(
            "/loans/guarantors/:consent_id/revoke",
            axum::routing::post(revoke_consent),
        )
}
