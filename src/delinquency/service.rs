//! Daily delinquency scan

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{level_for, DelinquencyLevel, DelinquencyRecord};
use crate::error::ApiResult;
use crate::events::DomainEvent;
use crate::schedule::{DeductionSchedule, ReconciliationStatus};

fn is_missed(status: ReconciliationStatus) -> bool {
    matches!(
        status,
        ReconciliationStatus::PartiallyPaid | ReconciliationStatus::Unmatched
    )
}

/// Consecutive missed periods, counting back from the most recent due row.
/// A matched (or overpaid) row breaks the streak.
fn consecutive_missed(due_rows_desc: &[ReconciliationStatus]) -> u32 {
    due_rows_desc
        .iter()
        .take_while(|status| is_missed(**status))
        .count() as u32
}

#[derive(Clone)]
pub struct DelinquencyMonitor {
    db_pool: PgPool,
    grace_days: i64,
}

impl DelinquencyMonitor {
    pub fn new(db_pool: PgPool, grace_days: i64) -> Self {
        Self { db_pool, grace_days }
    }

    /// Scan all active loans as of `as_of`. Emits an escalation event for
    /// every loan whose level changed; the schedule itself is never
    /// touched.
    pub async fn scan(&self, as_of: NaiveDate) -> ApiResult<Vec<DomainEvent>> {
        let loan_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM loan_register WHERE status = 'active'")
                .fetch_all(&self.db_pool)
                .await?;

        let mut events = Vec::new();
        for loan_id in loan_ids {
            if let Some(event) = self.scan_loan(loan_id, as_of).await? {
                events.push(event);
            }
        }

        tracing::info!(escalations = events.len(), as_of = %as_of, "Delinquency scan finished");
        Ok(events)
    }

    async fn scan_loan(&self, loan_id: Uuid, as_of: NaiveDate) -> ApiResult<Option<DomainEvent>> {
        // Only rows whose grace window has elapsed count as due
        let cutoff = as_of - Duration::days(self.grace_days);
        let due_rows = sqlx::query_as::<_, DeductionSchedule>(
            "SELECT * FROM deduction_schedules \
             WHERE loan_id = $1 AND due_date <= $2 \
             ORDER BY period_index DESC",
        )
        .bind(loan_id)
        .bind(cutoff)
        .fetch_all(&self.db_pool)
        .await?;

        let statuses: Vec<ReconciliationStatus> =
            due_rows.iter().map(|r| r.reconciliation_status).collect();
        let missed = consecutive_missed(&statuses);
        let level = level_for(missed);

        let previous: DelinquencyLevel =
            sqlx::query_scalar("SELECT delinquency_level FROM loan_register WHERE id = $1")
                .bind(loan_id)
                .fetch_one(&self.db_pool)
                .await?;

        if level == previous {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE loan_register SET delinquency_level = $1, updated_at = now() WHERE id = $2",
        )
        .bind(level)
        .bind(loan_id)
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO delinquency_records (id, loan_id, level, consecutive_missed, scanned_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(loan_id)
        .bind(level)
        .bind(missed as i32)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        // Keep the member's blocking flag in step so eligibility sees it
        sqlx::query(
            r#"
            UPDATE member_credit_profiles
            SET has_active_delinquency = EXISTS (
                SELECT 1 FROM loan_register
                WHERE member_id = member_credit_profiles.member_id
                  AND status = 'active'
                  AND delinquency_level IN ('delinquent', 'default_candidate')
            )
            WHERE member_id = (SELECT member_id FROM loan_register WHERE id = $1)
            "#,
        )
        .bind(loan_id)
        .execute(&self.db_pool)
        .await?;

        Ok(Some(DomainEvent::DelinquencyEscalated {
            loan_id,
            level,
            consecutive_missed: missed as i32,
        }))
    }

    /// Scan history for a loan, newest first.
    pub async fn history(&self, loan_id: Uuid) -> ApiResult<Vec<DelinquencyRecord>> {
        let records = sqlx::query_as::<_, DelinquencyRecord>(
            "SELECT * FROM delinquency_records WHERE loan_id = $1 ORDER BY scanned_at DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(records)
    }

    /// Loans currently at or above the watch level.
    pub async fn watchlist(&self) -> ApiResult<Vec<crate::register::LoanRegister>> {
        let loans = sqlx::query_as::<_, crate::register::LoanRegister>(
            "SELECT * FROM loan_register \
             WHERE status = 'active' AND delinquency_level <> 'current' \
             ORDER BY delinquency_level DESC, serial_year, serial_number",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(loans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_missed_counts_from_most_recent() {
        use ReconciliationStatus::*;
        assert_eq!(consecutive_missed(&[]), 0);
        assert_eq!(consecutive_missed(&[Matched, Unmatched]), 0);
        assert_eq!(consecutive_missed(&[Unmatched, Matched, Unmatched]), 1);
        assert_eq!(consecutive_missed(&[Unmatched, PartiallyPaid, Matched]), 2);
        assert_eq!(
            consecutive_missed(&[Unmatched, Unmatched, Unmatched, Unmatched]),
            4
        );
    }

    #[test]
    fn test_partial_payment_counts_as_missed() {
        use ReconciliationStatus::*;
        assert_eq!(consecutive_missed(&[PartiallyPaid]), 1);
        assert_eq!(consecutive_missed(&[Overpaid, Unmatched]), 0);
    }
}
