//! Threshold allocator
//!
//! The threshold row is the one shared mutable resource in the system. All
//! decrements go through a single conditional UPDATE (compare-and-decrement
//! guarded by `remaining_amount >= amount`), never a read followed by a
//! write, so two concurrent admissions can never jointly overspend the
//! ceiling. Queue draining holds the same discipline inside one
//! transaction.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    AllocationOutcome, DrainedAdmission, MonthlyThreshold, QueueEntry, RejectionReason,
    ThresholdStatus,
};
use crate::error::{is_retryable, ApiError, ApiResult};
use crate::models::Period;

const ALLOCATE_SQL: &str = r#"
    UPDATE monthly_thresholds
    SET allocated_amount = allocated_amount + $3,
        remaining_amount = remaining_amount - $3,
        total_applications_approved = total_applications_approved + 1,
        status = CASE WHEN remaining_amount - $3 = 0 THEN 'exhausted'::threshold_status
                      ELSE status END,
        updated_at = now()
    WHERE year = $1 AND month = $2
      AND status = 'open'
      AND remaining_amount >= $3
    RETURNING *
"#;

/// Admission control against the monthly lending ceiling
#[derive(Clone)]
pub struct ThresholdAllocator {
    db_pool: PgPool,
    default_maximum: i64,
    max_retries: u32,
}

impl ThresholdAllocator {
    pub fn new(db_pool: PgPool, default_maximum: i64, max_retries: u32) -> Self {
        Self {
            db_pool,
            default_maximum,
            max_retries,
        }
    }

    /// Fetch a period's threshold.
    pub async fn get(&self, period: Period) -> ApiResult<MonthlyThreshold> {
        sqlx::query_as::<_, MonthlyThreshold>(
            "SELECT * FROM monthly_thresholds WHERE year = $1 AND month = $2",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No threshold for period {}", period)))
    }

    /// Open a period with the given ceiling. Idempotent: an existing row is
    /// returned unchanged.
    pub async fn open_period(
        &self,
        period: Period,
        maximum_amount: i64,
    ) -> ApiResult<MonthlyThreshold> {
        let threshold = sqlx::query_as::<_, MonthlyThreshold>(
            r#"
            INSERT INTO monthly_thresholds (
                id, year, month, maximum_amount, allocated_amount, remaining_amount,
                total_applications_approved, total_applications_queued, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 0, $4, 0, 0, 'open', $5, $5)
            ON CONFLICT (year, month) DO UPDATE SET updated_at = monthly_thresholds.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(period.year)
        .bind(period.month as i32)
        .bind(maximum_amount)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(threshold)
    }

    /// Ensure the period exists, opening it with the configured default if
    /// the rollover has not created it yet.
    pub async fn ensure_period(&self, period: Period) -> ApiResult<MonthlyThreshold> {
        match self.get(period).await {
            Ok(t) => Ok(t),
            Err(ApiError::NotFound(_)) => self.open_period(period, self.default_maximum).await,
            Err(e) => Err(e),
        }
    }

    /// Try to admit `amount` against the period's remaining capacity.
    ///
    /// Returns `Admitted` on success, `Queued` with the 1-based FIFO
    /// position when capacity is insufficient, `Rejected` when the period
    /// is closed. Never partially allocates.
    pub async fn try_allocate(
        &self,
        period: Period,
        application_id: Uuid,
        amount: i64,
    ) -> ApiResult<AllocationOutcome> {
        if amount <= 0 {
            return Err(ApiError::Validation(
                "Allocation amount must be positive".to_string(),
            ));
        }

        let threshold = self.ensure_period(period).await?;
        if threshold.status == ThresholdStatus::Closed {
            return Ok(AllocationOutcome::Rejected {
                reason: RejectionReason::PeriodClosed,
            });
        }

        if self.compare_and_decrement(period, amount).await?.is_some() {
            return Ok(AllocationOutcome::Admitted {
                granted_amount: amount,
            });
        }

        // Re-read: the period may have closed between the check and the
        // failed decrement.
        let threshold = self.get(period).await?;
        if threshold.status == ThresholdStatus::Closed {
            return Ok(AllocationOutcome::Rejected {
                reason: RejectionReason::PeriodClosed,
            });
        }

        let position = self.enqueue(period, application_id, amount).await?;
        Ok(AllocationOutcome::Queued { position })
    }

    /// Release capacity back into a period (cancelled registration before
    /// disbursement) and drain the queue against it.
    pub async fn release(
        &self,
        period: Period,
        amount: i64,
    ) -> ApiResult<(MonthlyThreshold, Vec<DrainedAdmission>)> {
        let threshold = sqlx::query_as::<_, MonthlyThreshold>(
            r#"
            UPDATE monthly_thresholds
            SET allocated_amount = allocated_amount - $3,
                remaining_amount = remaining_amount + $3,
                status = CASE WHEN status = 'exhausted' THEN 'open'::threshold_status
                              ELSE status END,
                updated_at = now()
            WHERE year = $1 AND month = $2
              AND status <> 'closed'
              AND allocated_amount >= $3
            RETURNING *
            "#,
        )
        .bind(period.year)
        .bind(period.month as i32)
        .bind(amount)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Cannot release {} back into period {}",
                amount, period
            ))
        })?;

        let drained = self.drain_queue(period).await?;
        Ok((threshold, drained))
    }

    /// Administratively adjust a period's ceiling. Shrinking below what is
    /// already allocated would break the invariant and is refused.
    pub async fn adjust_ceiling(
        &self,
        period: Period,
        new_maximum: i64,
    ) -> ApiResult<(MonthlyThreshold, Vec<DrainedAdmission>)> {
        if new_maximum <= 0 {
            return Err(ApiError::Validation(
                "Ceiling must be positive".to_string(),
            ));
        }

        let threshold = sqlx::query_as::<_, MonthlyThreshold>(
            r#"
            UPDATE monthly_thresholds
            SET maximum_amount = $3,
                remaining_amount = $3 - allocated_amount,
                status = CASE
                    WHEN $3 - allocated_amount = 0 THEN 'exhausted'::threshold_status
                    WHEN status = 'exhausted' THEN 'open'::threshold_status
                    ELSE status END,
                updated_at = now()
            WHERE year = $1 AND month = $2
              AND status <> 'closed'
              AND allocated_amount <= $3
            RETURNING *
            "#,
        )
        .bind(period.year)
        .bind(period.month as i32)
        .bind(new_maximum)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Period {} is closed or already has more than {} allocated",
                period, new_maximum
            ))
        })?;

        let drained = self.drain_queue(period).await?;
        Ok((threshold, drained))
    }

    /// Close a period. Terminal: no further allocation or draining.
    /// Returns the closed row and the entries still queued against it.
    pub async fn close_period(
        &self,
        period: Period,
    ) -> ApiResult<(MonthlyThreshold, Vec<QueueEntry>)> {
        let mut tx = self.db_pool.begin().await?;

        let threshold = sqlx::query_as::<_, MonthlyThreshold>(
            "UPDATE monthly_thresholds SET status = 'closed', updated_at = now() \
             WHERE year = $1 AND month = $2 AND status <> 'closed' RETURNING *",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::PeriodClosed(format!("Period {} is already closed or absent", period))
        })?;

        let leftover = sqlx::query_as::<_, QueueEntry>(
            "DELETE FROM threshold_queue WHERE year = $1 AND month = $2 \
             RETURNING *",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut leftover = leftover;
        leftover.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then(a.application_id.cmp(&b.application_id))
        });

        Ok((threshold, leftover))
    }

    /// Re-queue entries carried over from a closing period at the head of
    /// the new period's queue, preserving their original order (their
    /// original submission timestamps predate anything queued natively).
    pub async fn requeue(&self, period: Period, entries: &[QueueEntry]) -> ApiResult<()> {
        let mut migrated: i32 = 0;
        for entry in entries {
            let inserted = sqlx::query(
                r#"
                INSERT INTO threshold_queue (id, year, month, application_id, amount, submitted_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (year, month, application_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(period.year)
            .bind(period.month as i32)
            .bind(entry.application_id)
            .bind(entry.amount)
            .bind(entry.submitted_at)
            .execute(&self.db_pool)
            .await?;
            migrated += inserted.rows_affected() as i32;
        }

        if migrated > 0 {
            sqlx::query(
                "UPDATE monthly_thresholds SET total_applications_queued = \
                 total_applications_queued + $3, updated_at = now() \
                 WHERE year = $1 AND month = $2",
            )
            .bind(period.year)
            .bind(period.month as i32)
            .bind(migrated)
            .execute(&self.db_pool)
            .await?;
        }

        Ok(())
    }

    /// Drain the period's queue in strict FIFO order: attempt the head,
    /// stop at the first entry that does not fit. No skip-ahead, even if a
    /// later, smaller entry would fit.
    ///
    /// Drains lock the threshold row for the whole transaction, so two
    /// concurrent drains serialize instead of one skipping past the head
    /// the other is still attempting.
    pub async fn drain_queue(&self, period: Period) -> ApiResult<Vec<DrainedAdmission>> {
        let mut tx = self.db_pool.begin().await?;
        let mut admitted = Vec::new();

        let threshold = sqlx::query_as::<_, MonthlyThreshold>(
            "SELECT * FROM monthly_thresholds WHERE year = $1 AND month = $2 FOR UPDATE",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_optional(&mut *tx)
        .await?;
        match threshold {
            Some(t) if t.status != ThresholdStatus::Closed => {}
            _ => {
                tx.commit().await?;
                return Ok(admitted);
            }
        }

        loop {
            let head = sqlx::query_as::<_, QueueEntry>(
                "SELECT * FROM threshold_queue WHERE year = $1 AND month = $2 \
                 ORDER BY submitted_at, application_id \
                 LIMIT 1 FOR UPDATE",
            )
            .bind(period.year)
            .bind(period.month as i32)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(entry) = head else { break };

            let updated = self
                .compare_and_decrement_tx(&mut tx, period, entry.amount)
                .await?;
            if updated.is_none() {
                break;
            }

            sqlx::query("DELETE FROM threshold_queue WHERE id = $1")
                .bind(entry.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE monthly_thresholds SET total_applications_queued = \
                 GREATEST(total_applications_queued - 1, 0) \
                 WHERE year = $1 AND month = $2",
            )
            .bind(period.year)
            .bind(period.month as i32)
            .execute(&mut *tx)
            .await?;

            admitted.push(DrainedAdmission {
                application_id: entry.application_id,
                amount: entry.amount,
            });
        }

        tx.commit().await?;
        Ok(admitted)
    }

    /// Queue entries for a period in FIFO order.
    pub async fn queued(&self, period: Period) -> ApiResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM threshold_queue WHERE year = $1 AND month = $2 \
             ORDER BY submitted_at, application_id",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(entries)
    }

    /// The compare-and-decrement, retried a bounded number of times on
    /// serialization conflicts, then surfaced as capacity exhaustion.
    async fn compare_and_decrement(
        &self,
        period: Period,
        amount: i64,
    ) -> ApiResult<Option<MonthlyThreshold>> {
        let mut attempt = 0;
        loop {
            let result = sqlx::query_as::<_, MonthlyThreshold>(ALLOCATE_SQL)
                .bind(period.year)
                .bind(period.month as i32)
                .bind(amount)
                .fetch_optional(&self.db_pool)
                .await;

            match result {
                Ok(row) => return Ok(row),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        period = %period,
                        attempt,
                        "Retrying threshold update after serialization conflict"
                    );
                }
                Err(e) if is_retryable(&e) => {
                    return Err(ApiError::CapacityExhausted(format!(
                        "Period {} under contention, retries exhausted",
                        period
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn compare_and_decrement_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        period: Period,
        amount: i64,
    ) -> ApiResult<Option<MonthlyThreshold>> {
        let row = sqlx::query_as::<_, MonthlyThreshold>(ALLOCATE_SQL)
            .bind(period.year)
            .bind(period.month as i32)
            .bind(amount)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row)
    }

    /// Append to the FIFO queue and return the 1-based position.
    async fn enqueue(
        &self,
        period: Period,
        application_id: Uuid,
        amount: i64,
    ) -> ApiResult<i64> {
        let submitted_at: chrono::DateTime<Utc> = sqlx::query_scalar(
            "SELECT COALESCE(submitted_at, created_at) FROM loan_applications WHERE id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.db_pool)
        .await?
        .unwrap_or_else(Utc::now);

        let inserted = sqlx::query(
            r#"
            INSERT INTO threshold_queue (id, year, month, application_id, amount, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (year, month, application_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(period.year)
        .bind(period.month as i32)
        .bind(application_id)
        .bind(amount)
        .bind(submitted_at)
        .execute(&self.db_pool)
        .await?;

        // A replayed enqueue hits the conflict and must not inflate the
        // queued counter
        if inserted.rows_affected() > 0 {
            sqlx::query(
                "UPDATE monthly_thresholds SET total_applications_queued = \
                 total_applications_queued + 1, updated_at = now() \
                 WHERE year = $1 AND month = $2",
            )
            .bind(period.year)
            .bind(period.month as i32)
            .execute(&self.db_pool)
            .await?;
        }

        let position: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM threshold_queue
            WHERE year = $1 AND month = $2
              AND (submitted_at, application_id) <=
                  (SELECT submitted_at, application_id FROM threshold_queue
                   WHERE year = $1 AND month = $2 AND application_id = $3)
            "#,
        )
        .bind(period.year)
        .bind(period.month as i32)
        .bind(application_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(position)
    }
}
