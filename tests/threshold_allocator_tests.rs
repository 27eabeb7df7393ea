//! Consistency tests for the monthly threshold allocator
//!
//! The database-backed tests exercise the allocator invariant
//! (allocated + remaining == maximum), concurrent admission against a
//! shared ceiling, FIFO queue draining and the month rollover. They need a
//! migrated PostgreSQL database and are ignored by default.

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use uuid::Uuid;

    use coopcredit::application::{ApplicationService, CreateApplicationRequest};
    use coopcredit::config::{Config, Environment};
    use coopcredit::consent::ConsentService;
    use coopcredit::eligibility::LoanType;
    use coopcredit::events::Notifier;
    use coopcredit::jobs::RolloverJob;
    use coopcredit::models::Period;
    use coopcredit::register_service::RegistrarService;
    use coopcredit::schedule::ScheduleService;
    use coopcredit::threshold::{AllocationOutcome, ThresholdAllocator};

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/coopcredit_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://localhost/coopcredit_test".to_string(),
            environment: Environment::Development,
            port: 3001,
            db_max_connections: 4,
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

    /// Remove any leftover state for a period so reruns start clean
    async fn reset_period(db_pool: &PgPool, period: Period) {
        sqlx::query("DELETE FROM threshold_queue WHERE year = $1 AND month = $2")
            .bind(period.year)
            .bind(period.month as i32)
            .execute(db_pool)
            .await
            .expect("Failed to clear queue");
        sqlx::query("DELETE FROM monthly_thresholds WHERE year = $1 AND month = $2")
            .bind(period.year)
            .bind(period.month as i32)
            .execute(db_pool)
            .await
            .expect("Failed to clear threshold");
    }

    /// Helper to create a submitted application carrying the given amount
    async fn create_application(db_pool: &PgPool, amount: i64) -> Uuid {
        let applications = ApplicationService::new(db_pool.clone());
        let application = applications
            .create(CreateApplicationRequest {
                member_id: Uuid::new_v4(),
                amount,
                loan_type: LoanType::Normal,
                tenor_months: 12,
                required_guarantors: 1,
            })
            .await
            .expect("Failed to create application");
        application.id
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_concurrent_allocations_admit_exactly_one() {
        let db_pool = setup_test_db().await;
        let allocator = ThresholdAllocator::new(db_pool.clone(), 100_000_000, 3);

        // Distinct far-future period so parallel tests do not interfere
        let period = Period::new(2091, 1).unwrap();
        reset_period(&db_pool, period).await;
        allocator
            .open_period(period, 1_000_000)
            .await
            .expect("Failed to open period");

        let app_a = create_application(&db_pool, 700_000).await;
        let app_b = create_application(&db_pool, 600_000).await;

        // Two simultaneous requests that jointly exceed the ceiling
        let alloc_a = allocator.try_allocate(period, app_a, 700_000);
        let alloc_b = allocator.try_allocate(period, app_b, 600_000);
        let (result_a, result_b) = tokio::join!(alloc_a, alloc_b);
        let result_a = result_a.expect("allocation a failed");
        let result_b = result_b.expect("allocation b failed");

        let admitted = [&result_a, &result_b]
            .iter()
            .filter(|r| matches!(r, AllocationOutcome::Admitted { .. }))
            .count();
        assert_eq!(admitted, 1, "exactly one of the two may be admitted");

        let threshold = allocator.get(period).await.expect("threshold missing");
        assert_eq!(
            threshold.allocated_amount + threshold.remaining_amount,
            threshold.maximum_amount
        );
        assert!(threshold.remaining_amount >= 0);
        assert!(
            threshold.remaining_amount == 300_000 || threshold.remaining_amount == 400_000,
            "remaining was {}",
            threshold.remaining_amount
        );
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_queue_drains_in_fifo_order_without_skip_ahead() {
        let db_pool = setup_test_db().await;
        let allocator = ThresholdAllocator::new(db_pool.clone(), 100_000_000, 3);

        let period = Period::new(2092, 1).unwrap();
        reset_period(&db_pool, period).await;
        allocator
            .open_period(period, 200)
            .await
            .expect("Failed to open period");

        let filler = create_application(&db_pool, 200).await;
        let first = create_application(&db_pool, 100).await;
        let second = create_application(&db_pool, 30).await;

        // Fill the period, then queue a large entry ahead of a small one
        assert!(matches!(
            allocator.try_allocate(period, filler, 200).await.unwrap(),
            AllocationOutcome::Admitted { .. }
        ));
        assert!(matches!(
            allocator.try_allocate(period, first, 100).await.unwrap(),
            AllocationOutcome::Queued { position: 1 }
        ));
        assert!(matches!(
            allocator.try_allocate(period, second, 30).await.unwrap(),
            AllocationOutcome::Queued { position: 2 }
        ));

        // 50 released: the head (100) does not fit, and the smaller entry
        // behind it must not jump the queue even though 30 would fit
        let (_, drained) = allocator.release(period, 50).await.unwrap();
        assert!(drained.is_empty(), "no entry may leapfrog the queue head");
        let queued = allocator.queued(period).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].application_id, first);
        assert_eq!(queued[1].application_id, second);

        // Another 60 released: the head now fits; the second entry (30)
        // still does not fit the 10 left over and stays queued
        let (_, drained) = allocator.release(period, 60).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].application_id, first);
        let queued = allocator.queued(period).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].application_id, second);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_invariant_holds_after_every_operation() {
        let db_pool = setup_test_db().await;
        let allocator = ThresholdAllocator::new(db_pool.clone(), 100_000_000, 3);

        let period = Period::new(2093, 1).unwrap();
        reset_period(&db_pool, period).await;
        allocator.open_period(period, 1_000_000).await.unwrap();

        let check = |t: &coopcredit::threshold::MonthlyThreshold| {
            assert_eq!(t.allocated_amount + t.remaining_amount, t.maximum_amount);
            assert!(t.remaining_amount >= 0);
        };

        let app = create_application(&db_pool, 400_000).await;
        allocator.try_allocate(period, app, 400_000).await.unwrap();
        check(&allocator.get(period).await.unwrap());

        let (threshold, _) = allocator.release(period, 150_000).await.unwrap();
        check(&threshold);

        let (threshold, _) = allocator.adjust_ceiling(period, 2_000_000).await.unwrap();
        check(&threshold);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_rollover_closes_every_stale_open_period() {
        let db_pool = setup_test_db().await;
        let config = test_config();
        let notifier = Notifier::new(None);
        let applications = ApplicationService::new(db_pool.clone());
        let consents = ConsentService::new(db_pool.clone(), 14);
        let allocator = ThresholdAllocator::new(db_pool.clone(), 100_000_000, 3);
        let schedules = ScheduleService::new(db_pool.clone(), 100);
        let registrar = RegistrarService::new(
            db_pool.clone(),
            applications,
            consents,
            allocator.clone(),
            schedules,
            config,
        );

        // Two past periods left open, as after an outage spanning two
        // month boundaries
        let first = Period::new(2020, 1).unwrap();
        let second = Period::new(2020, 2).unwrap();
        reset_period(&db_pool, first).await;
        reset_period(&db_pool, second).await;
        allocator.open_period(first, 500_000).await.unwrap();
        allocator.open_period(second, 500_000).await.unwrap();

        let rollover = RolloverJob::new(
            db_pool.clone(),
            allocator.clone(),
            registrar,
            notifier,
            100_000_000,
            0.0,
        );
        rollover.run().await.expect("rollover failed");

        for period in [first, second] {
            let threshold = allocator.get(period).await.unwrap();
            assert_eq!(
                threshold.status,
                coopcredit::threshold::ThresholdStatus::Closed,
                "period {} must be closed after catch-up",
                period
            );
        }
    }

    #[test]
    fn test_allocation_outcome_serialization() {
        let outcomes = vec![
            AllocationOutcome::Admitted {
                granted_amount: 500_000,
            },
            AllocationOutcome::Queued { position: 3 },
        ];

        for outcome in outcomes {
            let json = serde_json::to_string(&outcome).unwrap();
            assert!(!json.is_empty());
            assert!(json.contains("result"));
        }
    }
}
