//! HTTP surface tests
//!
//! Drives the router directly with `tower::ServiceExt::oneshot`, no server
//! and no database: request parsing, validation rejections and the error
//! body shape are all decided before a query runs. The pool is lazy and
//! points nowhere.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use coopcredit::application::ApplicationService;
    use coopcredit::committee::CommitteeService;
    use coopcredit::config::{Config, Environment};
    use coopcredit::consent::ConsentService;
    use coopcredit::delinquency::DelinquencyMonitor;
    use coopcredit::events::Notifier;
    use coopcredit::member::MemberDirectory;
    use coopcredit::register_service::RegistrarService;
    use coopcredit::schedule::ScheduleService;
    use coopcredit::state::AppState;
    use coopcredit::threshold::ThresholdAllocator;
    use coopcredit::{handlers, routes};

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://127.0.0.1:1/coopcredit".to_string(),
            environment: Environment::Development,
            port: 3001,
            db_max_connections: 1,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            notification_webhook_url: None,
            monthly_ceiling: 100_000_000,
            carry_forward_fraction: 0.0,
            savings_multiplier: 4.0,
            min_membership_months: 6,
            max_deduction_rate: 0.5,
            base_annual_rate_bps: 1200,
            grace_days: 5,
            reconciliation_tolerance: 100,
            consent_validity_days: 14,
            committee_quorum: None,
            allocation_max_retries: 3,
        }
    }

    /// Build the full route tree over a pool that connects to nothing.
    fn test_app() -> Router {
        let config = test_config();
        let db_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .expect("lazy pool");

        let notifier = Notifier::new(None);
        let members = MemberDirectory::new(db_pool.clone());
        let applications = ApplicationService::new(db_pool.clone());
        let consents = ConsentService::new(db_pool.clone(), config.consent_validity_days);
        let committee =
            CommitteeService::new(db_pool.clone(), applications.clone(), config.committee_quorum);
        let allocator = ThresholdAllocator::new(
            db_pool.clone(),
            config.monthly_ceiling,
            config.allocation_max_retries,
        );
        let schedules = ScheduleService::new(db_pool.clone(), config.reconciliation_tolerance);
        let registrar = RegistrarService::new(
            db_pool.clone(),
            applications.clone(),
            consents.clone(),
            allocator.clone(),
            schedules.clone(),
            config.clone(),
        );
        let delinquency = DelinquencyMonitor::new(db_pool.clone(), config.grace_days);

        let app_state = AppState {
            db_pool,
            config: Arc::new(config),
            members: Arc::new(members),
            applications: Arc::new(applications),
            consents: Arc::new(consents),
            committee: Arc::new(committee),
            allocator: Arc::new(allocator),
            registrar: Arc::new(registrar),
            schedules: Arc::new(schedules),
            delinquency: Arc::new(delinquency),
            notifier,
        };

        Router::new()
            .route("/health", get(handlers::health_check))
            .merge(routes::eligibility_routes())
            .merge(routes::application_routes())
            .merge(routes::consent_routes())
            .merge(routes::committee_routes())
            .merge(routes::threshold_routes())
            .merge(routes::register_routes())
            .merge(routes::schedule_routes())
            .merge(routes::delinquency_routes())
            .with_state(app_state)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_eligibility_amount_is_rejected_with_error_body() {
        let response = test_app()
            .oneshot(post_json(
                "/loans/eligibility",
                r#"{"member_id":"7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c","amount":0,"loan_type":"normal"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_eligibility_body_without_tenor_passes_validation() {
        // The tenor is optional; a request carrying only member, amount and
        // loan type must get past validation to the member lookup (which
        // then fails on the absent database, not on the request shape).
        let response = test_app()
            .oneshot(post_json(
                "/loans/eligibility",
                r#"{"member_id":"7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c","amount":400000,"loan_type":"normal"}"#,
            ))
            .await
            .unwrap();

        assert_ne!(response.status(), StatusCode::BAD_REQUEST);
        assert_ne!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_malformed_period_path_is_rejected() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/loans/threshold/2026-13")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/loans/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
