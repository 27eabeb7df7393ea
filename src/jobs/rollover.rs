//! Monthly rollover
//!
//! At each calendar month boundary: close the expiring threshold, open the
//! next one with the configured ceiling plus the configured fraction of
//! unused capacity carried forward, move entries still queued against the
//! closed period to the head of the new queue in their original order, then
//! drain and register whatever now fits.

use chrono::Utc;
use sqlx::PgPool;

use crate::error::ApiResult;
use crate::events::{DomainEvent, Notifier};
use crate::models::Period;
use crate::register_service::RegistrarService;
use crate::threshold::{MonthlyThreshold, ThresholdAllocator};

const JOB_NAME: &str = "monthly_rollover";

#[derive(Clone)]
pub struct RolloverJob {
    db_pool: PgPool,
    allocator: ThresholdAllocator,
    registrar: RegistrarService,
    notifier: Notifier,
    monthly_ceiling: i64,
    carry_forward_fraction: f64,
}

impl RolloverJob {
    pub fn new(
        db_pool: PgPool,
        allocator: ThresholdAllocator,
        registrar: RegistrarService,
        notifier: Notifier,
        monthly_ceiling: i64,
        carry_forward_fraction: f64,
    ) -> Self {
        Self {
            db_pool,
            allocator,
            registrar,
            notifier,
            monthly_ceiling,
            carry_forward_fraction,
        }
    }

    /// Roll the previous period into the current one. Invoked by the cron
    /// tick just after the month boundary.
    pub async fn run(&self) -> ApiResult<Period> {
        let current = Period::from_date(Utc::now().date_naive());
        self.roll_into(current).await?;
        super::record_run(&self.db_pool, JOB_NAME).await?;
        Ok(current)
    }

    /// On startup, roll forward if the last recorded run predates the
    /// current period (or never happened).
    pub async fn catch_up(&self) -> ApiResult<()> {
        let current = Period::from_date(Utc::now().date_naive());
        let last = super::last_run(&self.db_pool, JOB_NAME).await?;
        let caught_up = last
            .map(|at| Period::from_date(at.date_naive()) >= current)
            .unwrap_or(false);
        if caught_up {
            return Ok(());
        }

        tracing::info!(period = %current, "Catching up missed rollover");
        self.roll_into(current).await?;
        super::record_run(&self.db_pool, JOB_NAME).await
    }

    /// Close every open period before `target` and open `target` itself.
    /// A service outage spanning several month boundaries leaves several
    /// stale periods, all closed here in calendar order with their carry
    /// and leftover queues accumulated.
    async fn roll_into(&self, target: Period) -> ApiResult<()> {
        let mut events = Vec::new();
        let mut carried: i64 = 0;
        let mut migrated = Vec::new();

        let stale = sqlx::query_as::<_, MonthlyThreshold>(
            "SELECT * FROM monthly_thresholds \
             WHERE status <> 'closed' AND (year, month) < ($1, $2) \
             ORDER BY year, month",
        )
        .bind(target.year)
        .bind(target.month as i32)
        .fetch_all(&self.db_pool)
        .await?;

        for threshold in stale {
            let unused = threshold.remaining_amount;
            let (closed, leftover) = self.allocator.close_period(threshold.period()).await?;
            carried += (unused as f64 * self.carry_forward_fraction).floor() as i64;
            migrated.extend(leftover);
            events.push(DomainEvent::PeriodClosed {
                period: closed.period(),
                unused_capacity: unused,
            });
        }

        let maximum = self.monthly_ceiling + carried;
        let opened = self.allocator.open_period(target, maximum).await?;
        events.push(DomainEvent::PeriodOpened {
            period: target,
            maximum_amount: opened.maximum_amount,
            carried_forward: carried,
        });

        // Migrated entries keep their original submission order, which puts
        // them ahead of anything queued natively against the new period
        self.allocator.requeue(target, &migrated).await?;

        for admission in self.allocator.drain_queue(target).await? {
            let (_, mut more) = self
                .registrar
                .register_admitted(admission.application_id, target, admission.amount)
                .await?;
            events.append(&mut more);
        }

        self.notifier.publish(&events).await;
        Ok(())
    }
}
