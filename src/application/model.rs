//! Loan application models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::eligibility::LoanType;

/// Application lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Registered,
    Cancelled,
}

impl ApplicationStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    /// Registered, Rejected and Cancelled are terminal.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (Approved, Registered)
                | (Approved, Rejected)
                | (Approved, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        use ApplicationStatus::*;
        matches!(self, Registered | Rejected | Cancelled)
    }
}

/// Loan application
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanApplication {
    pub id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub loan_type: LoanType,
    pub tenor_months: i32,
    pub status: ApplicationStatus,
    /// Amount approved by the committee, capped per the aggregation rule
    pub approved_amount: Option<i64>,
    /// Tenor approved by the committee (shortest recommended)
    pub approved_tenor_months: Option<i32>,
    /// Number of guarantor consents required before registration
    pub required_guarantors: i32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a draft application
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApplicationRequest {
    pub member_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub loan_type: LoanType,
    #[validate(range(min = 1, max = 60))]
    pub tenor_months: i32,
    #[validate(range(min = 1, max = 5))]
    pub required_guarantors: i32,
}

/// Query for listing applications
#[derive(Debug, Deserialize)]
pub struct ListApplicationsQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<ApplicationStatus>,
}
