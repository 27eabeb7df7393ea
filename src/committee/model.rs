//! Committee review models and the aggregation rule
//!
//! Each assigned reviewer produces at most one terminal decision. The
//! aggregate is re-derived on every submission and never downgrades a
//! terminal rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Reviewer decision
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "review_decision", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Pending,
    Approved,
    Rejected,
    ApprovedWithConditions,
    RequiresMoreInformation,
}

impl ReviewDecision {
    pub fn is_decided(self) -> bool {
        self != ReviewDecision::Pending
    }

    pub fn is_approval(self) -> bool {
        matches!(
            self,
            ReviewDecision::Approved | ReviewDecision::ApprovedWithConditions
        )
    }
}

/// Committee review row; immutable once the decision is non-pending
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CommitteeReview {
    pub id: Uuid,
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: ReviewDecision,
    /// Member credit score snapshot at review time
    pub credit_score_snapshot: Option<i32>,
    pub risk_rating: Option<String>,
    pub recommended_amount: Option<i64>,
    pub recommended_tenor_months: Option<i32>,
    pub conditions: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate recommendation derived from the individual reviews
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AggregateOutcome {
    /// Not enough decisions yet
    Open,
    /// A reviewer asked for more information; aggregation stays open
    AwaitingInformation,
    /// Any single rejection rejects the application
    Rejected,
    /// All decided reviews approve; amount and tenor are capped
    /// conservatively
    Approved { amount: i64, tenor_months: i32 },
}

/// Derive the aggregate outcome.
///
/// The aggregate is evaluated once all `assigned` reviewers are decided, or
/// once `quorum` decisions exist when a quorum is configured. A rejection
/// short-circuits regardless of quorum. The admitted amount is capped at
/// the smallest recommendation, and conflicting tenors resolve to the
/// shortest.
pub fn aggregate(
    reviews: &[CommitteeReview],
    assigned: usize,
    quorum: Option<usize>,
    requested_amount: i64,
    requested_tenor_months: i32,
) -> AggregateOutcome {
    if reviews.iter().any(|r| r.decision == ReviewDecision::Rejected) {
        return AggregateOutcome::Rejected;
    }

    let decided: Vec<&CommitteeReview> =
        reviews.iter().filter(|r| r.decision.is_decided()).collect();

    let needed = match quorum {
        Some(q) => q.min(assigned.max(1)),
        None => assigned.max(1),
    };
    if decided.len() < needed {
        return AggregateOutcome::Open;
    }

    if decided
        .iter()
        .any(|r| r.decision == ReviewDecision::RequiresMoreInformation)
    {
        return AggregateOutcome::AwaitingInformation;
    }

    // Everything decided is an approval at this point
    debug_assert!(decided.iter().all(|r| r.decision.is_approval()));

    let amount = decided
        .iter()
        .filter_map(|r| r.recommended_amount)
        .min()
        .map_or(requested_amount, |m| m.min(requested_amount));

    let tenor_months = decided
        .iter()
        .filter_map(|r| r.recommended_tenor_months)
        .min()
        .map_or(requested_tenor_months, |t| t.min(requested_tenor_months));

    AggregateOutcome::Approved {
        amount,
        tenor_months,
    }
}

/// Reviewer decision submission
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitReviewRequest {
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: ReviewDecision,
    pub risk_rating: Option<String>,
    #[validate(range(min = 1))]
    pub recommended_amount: Option<i64>,
    #[validate(range(min = 1, max = 60))]
    pub recommended_tenor_months: Option<i32>,
    pub conditions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(
        decision: ReviewDecision,
        recommended_amount: Option<i64>,
        recommended_tenor_months: Option<i32>,
    ) -> CommitteeReview {
        CommitteeReview {
            id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            decision,
            credit_score_snapshot: Some(700),
            risk_rating: None,
            recommended_amount,
            recommended_tenor_months,
            conditions: None,
            decided_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_any_rejection_rejects() {
        let reviews = vec![
            review(ReviewDecision::Approved, None, None),
            review(ReviewDecision::Rejected, None, None),
        ];
        assert_eq!(
            aggregate(&reviews, 3, None, 500_000, 24),
            AggregateOutcome::Rejected
        );
        // Rejection short-circuits even below quorum
        let reviews = vec![review(ReviewDecision::Rejected, None, None)];
        assert_eq!(
            aggregate(&reviews, 3, Some(2), 500_000, 24),
            AggregateOutcome::Rejected
        );
    }

    #[test]
    fn test_open_until_all_assigned_decide() {
        let reviews = vec![review(ReviewDecision::Approved, None, None)];
        assert_eq!(
            aggregate(&reviews, 2, None, 500_000, 24),
            AggregateOutcome::Open
        );
    }

    #[test]
    fn test_quorum_allows_early_aggregation() {
        let reviews = vec![
            review(ReviewDecision::Approved, None, None),
            review(ReviewDecision::Approved, None, None),
        ];
        assert_eq!(
            aggregate(&reviews, 5, Some(2), 500_000, 24),
            AggregateOutcome::Approved {
                amount: 500_000,
                tenor_months: 24
            }
        );
    }

    #[test]
    fn test_more_information_keeps_aggregate_open() {
        let reviews = vec![
            review(ReviewDecision::Approved, None, None),
            review(ReviewDecision::RequiresMoreInformation, None, None),
        ];
        assert_eq!(
            aggregate(&reviews, 2, None, 500_000, 24),
            AggregateOutcome::AwaitingInformation
        );
    }

    #[test]
    fn test_amount_capped_at_smallest_recommendation() {
        // Approved(500k) + ApprovedWithConditions(450k) aggregates to
        // Approved capped at 450,000
        let reviews = vec![
            review(ReviewDecision::Approved, Some(500_000), None),
            review(
                ReviewDecision::ApprovedWithConditions,
                Some(450_000),
                None,
            ),
        ];
        assert_eq!(
            aggregate(&reviews, 2, None, 500_000, 24),
            AggregateOutcome::Approved {
                amount: 450_000,
                tenor_months: 24
            }
        );
    }

    #[test]
    fn test_amount_never_exceeds_requested() {
        let reviews = vec![review(ReviewDecision::Approved, Some(900_000), None)];
        assert_eq!(
            aggregate(&reviews, 1, None, 500_000, 24),
            AggregateOutcome::Approved {
                amount: 500_000,
                tenor_months: 24
            }
        );
    }

    #[test]
    fn test_conflicting_tenors_resolve_to_shortest() {
        let reviews = vec![
            review(ReviewDecision::Approved, None, Some(36)),
            review(ReviewDecision::Approved, None, Some(18)),
        ];
        assert_eq!(
            aggregate(&reviews, 2, None, 500_000, 24),
            AggregateOutcome::Approved {
                amount: 500_000,
                tenor_months: 18
            }
        );
    }

    #[test]
    fn test_pending_reviews_do_not_count_toward_quorum() {
        let reviews = vec![
            review(ReviewDecision::Approved, None, None),
            review(ReviewDecision::Pending, None, None),
        ];
        assert_eq!(
            aggregate(&reviews, 2, Some(2), 500_000, 24),
            AggregateOutcome::Open
        );
    }
}
