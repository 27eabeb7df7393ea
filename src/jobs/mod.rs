//! Calendar-driven background jobs
//!
//! Two jobs run against the wall clock: the monthly rollover at each period
//! boundary and the daily delinquency scan. Both are single-flight (a tick
//! that arrives while the previous run is still going is skipped) and
//! persist their last successful run so a missed boundary is caught up at
//! startup.

mod rollover;
mod runner;

pub use rollover::RolloverJob;
pub use runner::SingleFlight;

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::delinquency::DelinquencyMonitor;
use crate::error::ApiResult;
use crate::events::Notifier;

/// Wire the recurring jobs into a scheduler and start it.
pub async fn start(
    rollover: RolloverJob,
    monitor: DelinquencyMonitor,
    notifier: Notifier,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Catch up a boundary missed while the service was down
    if let Err(e) = rollover.catch_up().await {
        tracing::error!(error = %e, "Rollover catch-up failed");
    }

    let rollover_flight = Arc::new(SingleFlight::new("monthly_rollover"));
    let rollover_job = rollover.clone();
    scheduler
        .add(Job::new_async("0 5 0 1 * *", move |_id, _lock| {
            let job = rollover_job.clone();
            let flight = rollover_flight.clone();
            Box::pin(async move {
                flight
                    .run(|| async { job.run().await.map(|_| ()) })
                    .await;
            })
        })?)
        .await?;

    let scan_flight = Arc::new(SingleFlight::new("delinquency_scan"));
    scheduler
        .add(Job::new_async("0 30 1 * * *", move |_id, _lock| {
            let monitor = monitor.clone();
            let notifier = notifier.clone();
            let flight = scan_flight.clone();
            Box::pin(async move {
                flight
                    .run(|| async {
                        let events = monitor.scan(Utc::now().date_naive()).await?;
                        notifier.publish(&events).await;
                        Ok(())
                    })
                    .await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Background job scheduler started");
    Ok(scheduler)
}

/// Record a successful job run.
pub(crate) async fn record_run(
    db_pool: &sqlx::PgPool,
    job_name: &str,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO job_runs (job_name, last_run_at) VALUES ($1, $2)
        ON CONFLICT (job_name) DO UPDATE SET last_run_at = EXCLUDED.last_run_at
        "#,
    )
    .bind(job_name)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;
    Ok(())
}

pub(crate) async fn last_run(
    db_pool: &sqlx::PgPool,
    job_name: &str,
) -> ApiResult<Option<chrono::DateTime<Utc>>> {
    let last = sqlx::query_scalar("SELECT last_run_at FROM job_runs WHERE job_name = $1")
        .bind(job_name)
        .fetch_optional(db_pool)
        .await?;
    Ok(last)
}
