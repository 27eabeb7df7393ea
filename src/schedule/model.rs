//! Deduction schedule models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Period;

/// Reconciliation verdict for one scheduled deduction
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "reconciliation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    Matched,
    PartiallyPaid,
    Overpaid,
    Unmatched,
}

/// One expected monthly deduction of a loan's schedule
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct DeductionSchedule {
    pub id: Uuid,
    pub loan_id: Uuid,
    /// 1-based position within the loan's schedule
    pub period_index: i32,
    pub year: i32,
    pub month: i32,
    pub due_date: NaiveDate,
    pub installment: i64,
    pub principal_portion: i64,
    pub interest_portion: i64,
    pub balance_after: i64,
    pub reconciliation_status: ReconciliationStatus,
    /// Total actuals observed at the last reconciliation run
    pub actual_amount: Option<i64>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DeductionSchedule {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month as u32,
        }
    }
}

/// A payroll deduction actually received, keyed by its source reference so
/// re-uploads deduplicate
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ActualDeduction {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub amount: i64,
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Summary of a reconciliation run over one period
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub period: Period,
    pub total_scheduled: usize,
    pub matched: usize,
    pub partially_paid: usize,
    pub overpaid: usize,
    pub unmatched: usize,
}

/// Summary of an actuals upload
#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
}
