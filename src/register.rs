//! Loan register models
//!
//! A registered loan carries a serial that is unique, gap-free, and
//! monotonically increasing within its year. Serials are never reused,
//! including after cancellation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delinquency::DelinquencyLevel;
use crate::eligibility::LoanType;
use crate::models::Period;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_register_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanRegisterStatus {
    Active,
    Cancelled,
    Closed,
}

/// Loan register entry
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRegister {
    pub id: Uuid,
    pub application_id: Uuid,
    pub member_id: Uuid,
    pub loan_type: LoanType,
    pub serial_year: i32,
    pub serial_number: i32,
    pub principal: i64,
    pub annual_rate_bps: i32,
    pub tenor_months: i32,
    pub monthly_installment: i64,
    pub allocation_year: i32,
    pub allocation_month: i32,
    pub first_deduction_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub status: LoanRegisterStatus,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub delinquency_level: DelinquencyLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maturity is the registration date advanced by the tenor, clamping to the
/// last day of the month where needed.
pub fn maturity_date(registration_date: NaiveDate, tenor_months: i32) -> NaiveDate {
    registration_date
        .checked_add_months(chrono::Months::new(tenor_months.max(0) as u32))
        .unwrap_or(registration_date)
}

impl LoanRegister {
    /// Human-readable serial, e.g. `LN-2026-00042`.
    pub fn serial(&self) -> String {
        format!("LN-{:04}-{:05}", self.serial_year, self.serial_number)
    }

    pub fn allocation_period(&self) -> Period {
        Period {
            year: self.allocation_year,
            month: self.allocation_month as u32,
        }
    }
}

/// Outcome of a registration attempt
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered { loan: LoanRegister },
    AlreadyRegistered { loan: LoanRegister },
    Queued { position: i64 },
    Refused { reason: String },
}

#[derive(Debug, Deserialize)]
pub struct RegisterLoanRequest {
    pub application_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_formatting() {
        let loan = LoanRegister {
            id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            loan_type: LoanType::Normal,
            serial_year: 2026,
            serial_number: 42,
            principal: 500_000,
            annual_rate_bps: 1200,
            tenor_months: 24,
            monthly_installment: 23_537,
            allocation_year: 2026,
            allocation_month: 8,
            first_deduction_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            maturity_date: NaiveDate::from_ymd_opt(2028, 8, 15).unwrap(),
            status: LoanRegisterStatus::Active,
            disbursed_at: None,
            delinquency_level: DelinquencyLevel::Current,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(loan.serial(), "LN-2026-00042");
        assert_eq!(loan.allocation_period(), Period::new(2026, 8).unwrap());
    }

    #[test]
    fn test_maturity_is_registration_plus_tenor() {
        let registered = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();
        assert_eq!(
            maturity_date(registered, 24),
            NaiveDate::from_ymd_opt(2028, 8, 15).unwrap()
        );
        assert_eq!(
            maturity_date(registered, 5),
            NaiveDate::from_ymd_opt(2027, 1, 15).unwrap()
        );
        // Day-of-month clamps when the target month is shorter
        let month_end = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(
            maturity_date(month_end, 1),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
        );
    }
}
