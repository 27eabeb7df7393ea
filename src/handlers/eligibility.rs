//! Eligibility check handler

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::eligibility::{evaluate, EligibilityResult, LoanType, ProductRules};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct EligibilityCheckRequest {
    pub member_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    /// Defaults to the product's maximum tenor when omitted.
    #[validate(range(min = 1, max = 60))]
    pub tenor_months: Option<u32>,
    pub loan_type: LoanType,
}

/// Evaluate a member's eligibility for a prospective loan. Ineligibility is
/// a normal result with reasons, not an error.
pub async fn check_eligibility(
    State(app_state): State<AppState>,
    Json(request): Json<EligibilityCheckRequest>,
) -> ApiResult<Json<EligibilityResult>> {
    request.validate()?;

    let profile = app_state.members.get_profile(request.member_id).await?;
    let rules = ProductRules::for_loan_type(&app_state.config, request.loan_type);
    let tenor_months = request.tenor_months.unwrap_or(rules.max_tenor_months);
    let result = evaluate(
        &profile,
        request.amount,
        tenor_months,
        &rules,
        Utc::now().date_naive(),
    )?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_minimal_body() {
        // member, amount and loan type are enough; the tenor is optional
        let request: EligibilityCheckRequest = serde_json::from_str(
            r#"{"member_id":"7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c","amount":400000,"loan_type":"normal"}"#,
        )
        .unwrap();
        assert_eq!(request.tenor_months, None);
        assert!(request.validate().is_ok());

        let request: EligibilityCheckRequest = serde_json::from_str(
            r#"{"member_id":"7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c","amount":400000,"tenor_months":24,"loan_type":"normal"}"#,
        )
        .unwrap();
        assert_eq!(request.tenor_months, Some(24));
    }
}
