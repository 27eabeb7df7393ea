//! Schedule generation and reconciliation classification
//!
//! Both are pure functions. Generation produces equal installments with the
//! final period absorbing all rounding, so the principal portions sum to
//! the principal exactly. Classification compares one expected amount
//! against the total received, with a configured tolerance.

use chrono::NaiveDate;

use super::ReconciliationStatus;
use crate::eligibility::monthly_installment;
use crate::models::Period;

/// One generated schedule line, before persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleLine {
    pub period_index: u32,
    pub due_date: NaiveDate,
    pub installment: i64,
    pub principal_portion: i64,
    pub interest_portion: i64,
    pub balance_after: i64,
}

/// Generate the full amortization schedule.
///
/// Interest per period is the outstanding balance times the monthly rate,
/// rounded to the nearest minor unit; the principal portion is the
/// installment minus interest. The final period clears whatever balance
/// remains instead of using the formula installment, so rounding never
/// leaves a residual balance.
pub fn generate_schedule(
    principal: i64,
    annual_rate_bps: i32,
    tenor_months: u32,
    first_due: NaiveDate,
) -> Vec<ScheduleLine> {
    if principal <= 0 || tenor_months == 0 {
        return Vec::new();
    }

    let installment = monthly_installment(principal, annual_rate_bps, tenor_months);
    let monthly_rate = (annual_rate_bps.max(0)) as f64 / 10_000.0 / 12.0;
    let first_period = Period::from_date(first_due);

    let mut lines = Vec::with_capacity(tenor_months as usize);
    let mut balance = principal;

    for index in 0..tenor_months {
        let interest = (balance as f64 * monthly_rate).round() as i64;
        let is_last = index == tenor_months - 1;

        let (principal_portion, installment) = if is_last {
            // Final period absorbs the rounding drift
            (balance, balance + interest)
        } else {
            let portion = (installment - interest).clamp(0, balance);
            (portion, installment)
        };

        balance -= principal_portion;
        lines.push(ScheduleLine {
            period_index: index + 1,
            due_date: first_period.plus_months(index).first_day(),
            installment,
            principal_portion,
            interest_portion: interest,
            balance_after: balance,
        });

        if balance == 0 && !is_last {
            break;
        }
    }

    lines
}

/// Classify one expected deduction against the total amount received.
///
/// `actual` of `None` means no payroll record arrived at all. Amounts
/// within `tolerance` of the expectation count as matched.
pub fn classify(expected: i64, actual: Option<i64>, tolerance: i64) -> ReconciliationStatus {
    match actual {
        None => ReconciliationStatus::Unmatched,
        Some(received) => {
            let diff = received - expected;
            if diff.abs() <= tolerance {
                ReconciliationStatus::Matched
            } else if diff > 0 {
                ReconciliationStatus::Overpaid
            } else if received > 0 {
                ReconciliationStatus::PartiallyPaid
            } else {
                ReconciliationStatus::Unmatched
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
    }

    #[test]
    fn test_principal_portions_sum_to_principal_exactly() {
        for (principal, rate, tenor) in [
            (1_000_000_i64, 1200, 12_u32),
            (500_000, 1400, 7),
            (333_333, 900, 36),
            (100, 1200, 3),
        ] {
            let lines = generate_schedule(principal, rate, tenor, first_due());
            let total: i64 = lines.iter().map(|l| l.principal_portion).sum();
            assert_eq!(total, principal, "{} at {}bps over {}", principal, rate, tenor);
            assert_eq!(lines.last().unwrap().balance_after, 0);
        }
    }

    #[test]
    fn test_final_period_absorbs_rounding() {
        let lines = generate_schedule(1_000_000, 1200, 12, first_due());
        assert_eq!(lines.len(), 12);
        let regular = lines[0].installment;
        // All but the last installment are equal
        assert!(lines[..11].iter().all(|l| l.installment == regular));
        // The last differs from the regular one by at most a few units of
        // accumulated rounding
        let last = lines.last().unwrap();
        assert!((last.installment - regular).abs() < 100);
    }

    #[test]
    fn test_balance_decreases_monotonically() {
        let lines = generate_schedule(750_000, 1300, 24, first_due());
        let mut previous = 750_000;
        for line in &lines {
            assert!(line.balance_after < previous);
            assert_eq!(line.installment, line.principal_portion + line.interest_portion);
            previous = line.balance_after;
        }
    }

    #[test]
    fn test_due_dates_advance_monthly() {
        let lines = generate_schedule(120_000, 0, 14, first_due());
        assert_eq!(lines[0].due_date, NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        assert_eq!(lines[3].due_date, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(lines[4].due_date, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    }

    #[test]
    fn test_zero_rate_schedule_has_no_interest() {
        let lines = generate_schedule(120_000, 0, 12, first_due());
        assert!(lines.iter().all(|l| l.interest_portion == 0));
        let total: i64 = lines.iter().map(|l| l.principal_portion).sum();
        assert_eq!(total, 120_000);
    }

    #[test]
    fn test_degenerate_inputs_yield_empty_schedule() {
        assert!(generate_schedule(0, 1200, 12, first_due()).is_empty());
        assert!(generate_schedule(-5, 1200, 12, first_due()).is_empty());
        assert!(generate_schedule(100_000, 1200, 0, first_due()).is_empty());
    }

    #[test]
    fn test_classify_within_tolerance_matches() {
        assert_eq!(classify(10_000, Some(10_000), 0), ReconciliationStatus::Matched);
        assert_eq!(classify(10_000, Some(9_950), 100), ReconciliationStatus::Matched);
        assert_eq!(classify(10_000, Some(10_100), 100), ReconciliationStatus::Matched);
    }

    #[test]
    fn test_classify_partial_over_and_unmatched() {
        assert_eq!(
            classify(10_000, Some(4_000), 100),
            ReconciliationStatus::PartiallyPaid
        );
        assert_eq!(
            classify(10_000, Some(12_000), 100),
            ReconciliationStatus::Overpaid
        );
        assert_eq!(classify(10_000, None, 100), ReconciliationStatus::Unmatched);
        assert_eq!(classify(10_000, Some(0), 100), ReconciliationStatus::Unmatched);
    }

    #[test]
    fn test_classify_is_deterministic_at_the_boundary() {
        // Exactly tolerance away is still a match; one unit further is not
        assert_eq!(classify(10_000, Some(9_900), 100), ReconciliationStatus::Matched);
        assert_eq!(
            classify(10_000, Some(9_899), 100),
            ReconciliationStatus::PartiallyPaid
        );
        assert_eq!(
            classify(10_000, Some(10_101), 100),
            ReconciliationStatus::Overpaid
        );
    }
}
