//! Member credit profile (read-only input)
//!
//! The profile is owned by the external membership system; this service only
//! reads the aggregated snapshot used by eligibility and committee review.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Aggregated member credit snapshot
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberCreditProfile {
    pub member_id: Uuid,
    /// Total accumulated savings in minor units
    pub total_savings: i64,
    /// Monthly contribution in minor units
    pub monthly_contribution: i64,
    pub membership_start: NaiveDate,
    /// Outstanding principal across active loans, minor units
    pub active_loan_exposure: i64,
    /// Derived repayment score from the external credit system (0-1000)
    pub repayment_score: i32,
    /// Whether the member currently has a blocking delinquent loan
    pub has_active_delinquency: bool,
}

/// Read-only access to member credit profiles
#[derive(Clone)]
pub struct MemberDirectory {
    db_pool: PgPool,
}

impl MemberDirectory {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn get_profile(&self, member_id: Uuid) -> ApiResult<MemberCreditProfile> {
        let profile = sqlx::query_as::<_, MemberCreditProfile>(
            "SELECT member_id, total_savings, monthly_contribution, membership_start, \
             active_loan_exposure, repayment_score, has_active_delinquency \
             FROM member_credit_profiles WHERE member_id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member {} not found", member_id)))?;

        Ok(profile)
    }
}
