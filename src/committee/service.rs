//! Committee service layer

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::{aggregate, AggregateOutcome, CommitteeReview, ReviewDecision, SubmitReviewRequest};
use crate::application::{ApplicationService, ApplicationStatus};
use crate::error::{ApiError, ApiResult};
use crate::events::DomainEvent;

/// Service collecting reviewer decisions and applying the aggregate to the
/// application
#[derive(Clone)]
pub struct CommitteeService {
    db_pool: PgPool,
    applications: ApplicationService,
    quorum: Option<u32>,
}

impl CommitteeService {
    pub fn new(db_pool: PgPool, applications: ApplicationService, quorum: Option<u32>) -> Self {
        Self {
            db_pool,
            applications,
            quorum,
        }
    }

    /// Assign a reviewer to an application (creates a pending review row).
    pub async fn assign_reviewer(
        &self,
        application_id: Uuid,
        reviewer_id: Uuid,
    ) -> ApiResult<CommitteeReview> {
        let review = sqlx::query_as::<_, CommitteeReview>(
            r#"
            INSERT INTO committee_reviews (
                id, application_id, reviewer_id, decision, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (application_id, reviewer_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(reviewer_id)
        .bind(ReviewDecision::Pending)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Reviewer {} is already assigned to application {}",
                reviewer_id, application_id
            ))
        })?;

        Ok(review)
    }

    /// Submit a reviewer's decision and re-derive the aggregate. Decisions
    /// are immutable once non-pending; a second submission is rejected.
    pub async fn submit_review(
        &self,
        request: SubmitReviewRequest,
    ) -> ApiResult<(CommitteeReview, AggregateOutcome, Vec<DomainEvent>)> {
        request.validate()?;
        if request.decision == ReviewDecision::Pending {
            return Err(ApiError::Validation(
                "A submitted decision cannot be pending".to_string(),
            ));
        }

        let application = self.applications.get(request.application_id).await?;
        if application.status != ApplicationStatus::Submitted {
            return Err(ApiError::Conflict(format!(
                "Application {} is not under review (status {:?})",
                application.id, application.status
            )));
        }

        let credit_score: Option<i32> = sqlx::query_scalar(
            "SELECT repayment_score FROM member_credit_profiles WHERE member_id = $1",
        )
        .bind(application.member_id)
        .fetch_optional(&self.db_pool)
        .await?;

        // The conditional update enforces immutability: only a pending
        // assignment row can receive a decision.
        let review = sqlx::query_as::<_, CommitteeReview>(
            r#"
            UPDATE committee_reviews
            SET decision = $1, credit_score_snapshot = $2, risk_rating = $3,
                recommended_amount = $4, recommended_tenor_months = $5,
                conditions = $6, decided_at = $7
            WHERE application_id = $8 AND reviewer_id = $9 AND decision = 'pending'
            RETURNING *
            "#,
        )
        .bind(request.decision)
        .bind(credit_score)
        .bind(&request.risk_rating)
        .bind(request.recommended_amount)
        .bind(request.recommended_tenor_months)
        .bind(&request.conditions)
        .bind(Utc::now())
        .bind(request.application_id)
        .bind(request.reviewer_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Reviewer {} has no pending assignment for application {}",
                request.reviewer_id, request.application_id
            ))
        })?;

        let (outcome, events) = self.apply_aggregate(&application.id).await?;

        Ok((review, outcome, events))
    }

    /// Reviews for an application.
    pub async fn list_reviews(&self, application_id: Uuid) -> ApiResult<Vec<CommitteeReview>> {
        let reviews = sqlx::query_as::<_, CommitteeReview>(
            "SELECT * FROM committee_reviews WHERE application_id = $1 ORDER BY created_at",
        )
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(reviews)
    }

    /// Current aggregate for an application without mutating anything.
    pub async fn current_aggregate(&self, application_id: Uuid) -> ApiResult<AggregateOutcome> {
        let application = self.applications.get(application_id).await?;

        // A terminal rejection is never downgraded, whatever later reviews
        // would say.
        if application.status == ApplicationStatus::Rejected {
            return Ok(AggregateOutcome::Rejected);
        }

        let reviews = self.list_reviews(application_id).await?;
        Ok(aggregate(
            &reviews,
            reviews.len(),
            self.quorum.map(|q| q as usize),
            application.amount,
            application.tenor_months,
        ))
    }

    /// Re-derive the aggregate and push terminal outcomes onto the
    /// application.
    async fn apply_aggregate(
        &self,
        application_id: &Uuid,
    ) -> ApiResult<(AggregateOutcome, Vec<DomainEvent>)> {
        let outcome = self.current_aggregate(*application_id).await?;
        let mut events = Vec::new();

        match &outcome {
            AggregateOutcome::Rejected => {
                let application = self.applications.get(*application_id).await?;
                if application.status != ApplicationStatus::Rejected {
                    self.applications
                        .set_committee_outcome(
                            *application_id,
                            ApplicationStatus::Rejected,
                            None,
                            None,
                        )
                        .await?;
                }
                events.push(DomainEvent::CommitteeDecided {
                    application_id: *application_id,
                    outcome: "rejected".to_string(),
                    approved_amount: None,
                });
            }
            AggregateOutcome::Approved {
                amount,
                tenor_months,
            } => {
                self.applications
                    .set_committee_outcome(
                        *application_id,
                        ApplicationStatus::Approved,
                        Some(*amount),
                        Some(*tenor_months),
                    )
                    .await?;
                events.push(DomainEvent::CommitteeDecided {
                    application_id: *application_id,
                    outcome: "approved".to_string(),
                    approved_amount: Some(*amount),
                });
            }
            AggregateOutcome::Open | AggregateOutcome::AwaitingInformation => {}
        }

        Ok((outcome, events))
    }
}
