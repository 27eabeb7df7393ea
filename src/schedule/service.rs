//! Schedule persistence and the reconciliation run

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    classify, generate_schedule, ActualDeduction, DeductionSchedule, ReconciliationReport,
    ReconciliationStatus, UploadSummary,
};
use crate::error::{ApiError, ApiResult};
use crate::events::DomainEvent;
use crate::models::Period;
use crate::register::LoanRegister;

#[derive(Clone)]
pub struct ScheduleService {
    db_pool: PgPool,
    tolerance: i64,
}

impl ScheduleService {
    pub fn new(db_pool: PgPool, tolerance: i64) -> Self {
        Self { db_pool, tolerance }
    }

    /// Materialize the loan's schedule. Idempotent: an existing schedule is
    /// left untouched, including any reconciliation already recorded on it.
    pub async fn generate_for_loan(&self, loan: &LoanRegister) -> ApiResult<Vec<DeductionSchedule>> {
        let existing = self.list_for_loan(loan.id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let lines = generate_schedule(
            loan.principal,
            loan.annual_rate_bps,
            loan.tenor_months as u32,
            loan.first_deduction_date,
        );

        let mut tx = self.db_pool.begin().await?;
        for line in &lines {
            let period = Period::from_date(line.due_date);
            sqlx::query(
                r#"
                INSERT INTO deduction_schedules (
                    id, loan_id, period_index, year, month, due_date,
                    installment, principal_portion, interest_portion, balance_after,
                    reconciliation_status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (loan_id, period_index) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan.id)
            .bind(line.period_index as i32)
            .bind(period.year)
            .bind(period.month as i32)
            .bind(line.due_date)
            .bind(line.installment)
            .bind(line.principal_portion)
            .bind(line.interest_portion)
            .bind(line.balance_after)
            .bind(ReconciliationStatus::Pending)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.list_for_loan(loan.id).await
    }

    /// Backfill schedules for any active loan that lacks one. Registration
    /// already generates schedules, so this only repairs interrupted
    /// registrations. Returns the number of loans backfilled.
    pub async fn backfill_active_loans(&self) -> ApiResult<usize> {
        let loans = sqlx::query_as::<_, LoanRegister>(
            r#"
            SELECT lr.* FROM loan_register lr
            WHERE lr.status = 'active'
              AND NOT EXISTS (SELECT 1 FROM deduction_schedules ds WHERE ds.loan_id = lr.id)
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        let count = loans.len();
        for loan in &loans {
            self.generate_for_loan(loan).await?;
        }
        if count > 0 {
            tracing::info!(loans = count, "Backfilled missing deduction schedules");
        }
        Ok(count)
    }

    pub async fn list_for_loan(&self, loan_id: Uuid) -> ApiResult<Vec<DeductionSchedule>> {
        let rows = sqlx::query_as::<_, DeductionSchedule>(
            "SELECT * FROM deduction_schedules WHERE loan_id = $1 ORDER BY period_index",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    /// All deductions falling due in a period, across loans. This is the
    /// payroll deduction report.
    pub async fn period_report(&self, period: Period) -> ApiResult<Vec<DeductionSchedule>> {
        let rows = sqlx::query_as::<_, DeductionSchedule>(
            r#"
            SELECT ds.* FROM deduction_schedules ds
            JOIN loan_register lr ON lr.id = ds.loan_id
            WHERE ds.year = $1 AND ds.month = $2 AND lr.status = 'active'
            ORDER BY ds.loan_id, ds.period_index
            "#,
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    /// Record received payroll deductions. Rows are keyed by
    /// (loan, period, source_ref); re-uploading the same file is a no-op.
    pub async fn record_actuals(
        &self,
        actuals: Vec<(Uuid, Period, i64, String)>,
    ) -> ApiResult<UploadSummary> {
        let received = actuals.len();
        let mut inserted = 0;

        for (loan_id, period, amount, source_ref) in actuals {
            if amount < 0 {
                return Err(ApiError::Validation(format!(
                    "Negative deduction amount {} for loan {}",
                    amount, loan_id
                )));
            }
            let result = sqlx::query(
                r#"
                INSERT INTO actual_deductions (id, loan_id, year, month, amount, source_ref, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (loan_id, year, month, source_ref) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan_id)
            .bind(period.year)
            .bind(period.month as i32)
            .bind(amount)
            .bind(&source_ref)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        Ok(UploadSummary {
            received,
            inserted,
            duplicates: received - inserted,
        })
    }

    pub async fn actuals_for_period(&self, period: Period) -> ApiResult<Vec<ActualDeduction>> {
        let rows = sqlx::query_as::<_, ActualDeduction>(
            "SELECT * FROM actual_deductions WHERE year = $1 AND month = $2 \
             ORDER BY loan_id, source_ref",
        )
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    /// Reconcile a period: classify every scheduled deduction due in it
    /// against the sum of actuals received for that loan and period.
    ///
    /// Idempotent by overwrite: re-running after more actuals arrive
    /// replaces each verdict with the one the full data supports.
    pub async fn reconcile(
        &self,
        period: Period,
    ) -> ApiResult<(ReconciliationReport, Vec<DomainEvent>)> {
        let scheduled = self.period_report(period).await?;

        let mut report = ReconciliationReport {
            period,
            total_scheduled: scheduled.len(),
            matched: 0,
            partially_paid: 0,
            overpaid: 0,
            unmatched: 0,
        };

        for row in &scheduled {
            let total: Option<i64> = sqlx::query_scalar(
                "SELECT SUM(amount)::bigint FROM actual_deductions \
                 WHERE loan_id = $1 AND year = $2 AND month = $3",
            )
            .bind(row.loan_id)
            .bind(period.year)
            .bind(period.month as i32)
            .fetch_one(&self.db_pool)
            .await?;

            let status = classify(row.installment, total, self.tolerance);
            match status {
                ReconciliationStatus::Matched => report.matched += 1,
                ReconciliationStatus::PartiallyPaid => report.partially_paid += 1,
                ReconciliationStatus::Overpaid => report.overpaid += 1,
                ReconciliationStatus::Unmatched => report.unmatched += 1,
                ReconciliationStatus::Pending => unreachable!("classify never returns pending"),
            }

            sqlx::query(
                "UPDATE deduction_schedules \
                 SET reconciliation_status = $1, actual_amount = $2, reconciled_at = $3 \
                 WHERE id = $4",
            )
            .bind(status)
            .bind(total)
            .bind(Utc::now())
            .bind(row.id)
            .execute(&self.db_pool)
            .await?;
        }

        let events = vec![DomainEvent::ReconciliationCompleted {
            period,
            matched: report.matched,
            partially_paid: report.partially_paid,
            overpaid: report.overpaid,
            unmatched: report.unmatched,
        }];

        Ok((report, events))
    }
}
