//! Eligibility evaluation and amortization math
//!
//! The evaluator is a pure function over a member snapshot, a requested
//! amount and the product rules: no side effects, deterministic for
//! identical inputs. The verdict is computed on demand and never persisted
//! as authoritative state.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::member::MemberCreditProfile;

/// Loan product type
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Normal,
    Emergency,
    Development,
}

/// Product rules a request is evaluated against
#[derive(Debug, Clone, Serialize)]
pub struct ProductRules {
    pub savings_multiplier: f64,
    pub min_membership_months: u32,
    pub max_deduction_rate: f64,
    pub annual_rate_bps: i32,
    pub max_tenor_months: u32,
}

impl ProductRules {
    /// Rules for a loan type, derived from the configured base parameters.
    pub fn for_loan_type(config: &Config, loan_type: LoanType) -> Self {
        let base = ProductRules {
            savings_multiplier: config.savings_multiplier,
            min_membership_months: config.min_membership_months,
            max_deduction_rate: config.max_deduction_rate,
            annual_rate_bps: config.base_annual_rate_bps,
            max_tenor_months: 36,
        };
        match loan_type {
            LoanType::Normal => base,
            // Emergency loans trade a shorter tenor and higher rate for a
            // relaxed membership requirement.
            LoanType::Emergency => ProductRules {
                min_membership_months: base.min_membership_months.min(3),
                annual_rate_bps: base.annual_rate_bps + 200,
                max_tenor_months: 12,
                ..base
            },
            LoanType::Development => ProductRules {
                annual_rate_bps: (base.annual_rate_bps - 100).max(0),
                max_tenor_months: 60,
                ..base
            },
        }
    }
}

/// Eligibility verdict with the numeric basis behind each sub-check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub is_eligible: bool,
    pub reasons: Vec<String>,

    pub requested_amount: i64,
    pub required_savings: i64,
    pub actual_savings: i64,
    pub meets_savings_requirement: bool,

    pub membership_duration_months: u32,
    pub required_membership_months: u32,
    pub meets_membership_duration: bool,

    pub monthly_emi: i64,
    pub monthly_contribution: i64,
    pub deduction_rate: f64,
    pub max_deduction_rate: f64,
    pub meets_deduction_rate_requirement: bool,

    pub has_blocking_delinquency: bool,
}

/// Equal monthly installment for the given principal, annual rate in basis
/// points and tenor, via the standard amortization formula. Rounds to the
/// nearest minor unit; a zero rate degrades to straight-line repayment.
pub fn monthly_installment(principal: i64, annual_rate_bps: i32, tenor_months: u32) -> i64 {
    if tenor_months == 0 || principal <= 0 {
        return 0;
    }
    if annual_rate_bps <= 0 {
        // Ceiling division so the installments cover the principal
        return (principal + tenor_months as i64 - 1) / tenor_months as i64;
    }
    let rate = annual_rate_bps as f64 / 10_000.0 / 12.0;
    let factor = (1.0 + rate).powi(tenor_months as i32);
    let emi = principal as f64 * rate * factor / (factor - 1.0);
    emi.round() as i64
}

/// Whole months elapsed between two dates (partial months truncated).
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let mut months =
        (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0) as u32
}

/// Evaluate a member's eligibility for the requested amount under the given
/// product rules. Fails fast with a validation error on malformed numeric
/// inputs before any evaluation runs.
pub fn evaluate(
    profile: &MemberCreditProfile,
    requested_amount: i64,
    tenor_months: u32,
    rules: &ProductRules,
    as_of: NaiveDate,
) -> ApiResult<EligibilityResult> {
    if requested_amount <= 0 {
        return Err(ApiError::Validation(
            "Requested amount must be positive".to_string(),
        ));
    }
    if tenor_months == 0 {
        return Err(ApiError::Validation("Tenor must be at least one month".to_string()));
    }
    if tenor_months > rules.max_tenor_months {
        return Err(ApiError::Validation(format!(
            "Tenor of {} months exceeds the product maximum of {}",
            tenor_months, rules.max_tenor_months
        )));
    }
    if profile.monthly_contribution <= 0 {
        return Err(ApiError::Validation(
            "Member has no positive monthly contribution on record".to_string(),
        ));
    }

    let mut reasons = Vec::new();

    let required_savings =
        (requested_amount as f64 / rules.savings_multiplier).ceil() as i64;
    let meets_savings_requirement = profile.total_savings >= required_savings;
    if !meets_savings_requirement {
        reasons.push(format!(
            "Savings of {} are below the required {} (requested amount / multiplier {})",
            profile.total_savings, required_savings, rules.savings_multiplier
        ));
    }

    let membership_duration_months = whole_months_between(profile.membership_start, as_of);
    let meets_membership_duration = membership_duration_months >= rules.min_membership_months;
    if !meets_membership_duration {
        reasons.push(format!(
            "Membership of {} months is below the required {} months",
            membership_duration_months, rules.min_membership_months
        ));
    }

    let monthly_emi = monthly_installment(requested_amount, rules.annual_rate_bps, tenor_months);
    let deduction_rate = monthly_emi as f64 / profile.monthly_contribution as f64;
    let meets_deduction_rate_requirement = deduction_rate <= rules.max_deduction_rate;
    if !meets_deduction_rate_requirement {
        reasons.push(format!(
            "Monthly installment of {} is {:.0}% of the contribution, above the {:.0}% cap",
            monthly_emi,
            deduction_rate * 100.0,
            rules.max_deduction_rate * 100.0
        ));
    }

    let has_blocking_delinquency = profile.has_active_delinquency;
    if has_blocking_delinquency {
        reasons.push("Member has an active delinquent loan".to_string());
    }

    let is_eligible = meets_savings_requirement
        && meets_membership_duration
        && meets_deduction_rate_requirement
        && !has_blocking_delinquency;

    Ok(EligibilityResult {
        is_eligible,
        reasons,
        requested_amount,
        required_savings,
        actual_savings: profile.total_savings,
        meets_savings_requirement,
        membership_duration_months,
        required_membership_months: rules.min_membership_months,
        monthly_emi,
        monthly_contribution: profile.monthly_contribution,
        deduction_rate,
        max_deduction_rate: rules.max_deduction_rate,
        meets_deduction_rate_requirement,
        has_blocking_delinquency,
        meets_membership_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rules() -> ProductRules {
        ProductRules {
            savings_multiplier: 4.0,
            min_membership_months: 6,
            max_deduction_rate: 0.5,
            annual_rate_bps: 1200,
            max_tenor_months: 36,
        }
    }

    fn profile(total_savings: i64, monthly_contribution: i64) -> MemberCreditProfile {
        MemberCreditProfile {
            member_id: Uuid::new_v4(),
            total_savings,
            monthly_contribution,
            membership_start: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            active_loan_exposure: 0,
            repayment_score: 700,
            has_active_delinquency: false,
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 15).unwrap()
    }

    #[test]
    fn test_monthly_installment_zero_rate_is_straight_line() {
        assert_eq!(monthly_installment(120_000, 0, 12), 10_000);
        // Remainder rounds up so the tenor covers the principal
        assert_eq!(monthly_installment(100, 0, 3), 34);
    }

    #[test]
    fn test_monthly_installment_standard_amortization() {
        // 1,000,000 at 12% over 12 months: EMI ~ 88,849
        let emi = monthly_installment(1_000_000, 1200, 12);
        assert!((88_000..90_000).contains(&emi), "emi was {}", emi);
        // Total paid exceeds principal when interest applies
        assert!(emi * 12 > 1_000_000);
    }

    #[test]
    fn test_whole_months_between_truncates_partial_months() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(
            whole_months_between(from, NaiveDate::from_ymd_opt(2026, 3, 19).unwrap()),
            1
        );
        assert_eq!(
            whole_months_between(from, NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()),
            2
        );
        // Never negative
        assert_eq!(
            whole_months_between(from, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()),
            0
        );
    }

    #[test]
    fn test_savings_requirement_shortfall_blocks() {
        // Multiplier 4, requested 400,000 => required savings 100,000;
        // actual 90,000 fails the check.
        let result = evaluate(&profile(90_000, 500_000), 400_000, 24, &rules(), as_of()).unwrap();
        assert_eq!(result.required_savings, 100_000);
        assert!(!result.meets_savings_requirement);
        assert!(!result.is_eligible);
        assert!(result.reasons.iter().any(|r| r.contains("Savings")));
    }

    #[test]
    fn test_eligible_member_passes_all_checks() {
        let result =
            evaluate(&profile(200_000, 500_000), 400_000, 24, &rules(), as_of()).unwrap();
        assert!(result.is_eligible, "reasons: {:?}", result.reasons);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_deduction_rate_cap() {
        // Tiny contribution makes the EMI ratio blow past the 50% cap
        let result = evaluate(&profile(200_000, 10_000), 400_000, 24, &rules(), as_of()).unwrap();
        assert!(!result.meets_deduction_rate_requirement);
        assert!(!result.is_eligible);
    }

    #[test]
    fn test_membership_duration_check() {
        let mut p = profile(200_000, 500_000);
        p.membership_start = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let result = evaluate(&p, 400_000, 24, &rules(), as_of()).unwrap();
        assert!(!result.meets_membership_duration);
        assert!(!result.is_eligible);
    }

    #[test]
    fn test_active_delinquency_blocks() {
        let mut p = profile(200_000, 500_000);
        p.has_active_delinquency = true;
        let result = evaluate(&p, 400_000, 24, &rules(), as_of()).unwrap();
        assert!(!result.is_eligible);
        assert!(result.reasons.iter().any(|r| r.contains("delinquent")));
    }

    #[test]
    fn test_malformed_inputs_fail_fast() {
        let p = profile(200_000, 500_000);
        assert!(evaluate(&p, 0, 24, &rules(), as_of()).is_err());
        assert!(evaluate(&p, -5, 24, &rules(), as_of()).is_err());
        assert!(evaluate(&p, 400_000, 0, &rules(), as_of()).is_err());
        assert!(evaluate(&p, 400_000, 999, &rules(), as_of()).is_err());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let p = profile(123_456, 50_000);
        let a = evaluate(&p, 300_000, 18, &rules(), as_of()).unwrap();
        let b = evaluate(&p, 300_000, 18, &rules(), as_of()).unwrap();
        assert_eq!(a.is_eligible, b.is_eligible);
        assert_eq!(a.reasons, b.reasons);
        assert_eq!(a.monthly_emi, b.monthly_emi);
        assert_eq!(a.required_savings, b.required_savings);
    }
}
