//! Application service layer

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::{ApplicationStatus, CreateApplicationRequest, ListApplicationsQuery, LoanApplication};
use crate::error::{ApiError, ApiResult};
use crate::events::DomainEvent;

/// Service managing the loan application lifecycle
#[derive(Clone)]
pub struct ApplicationService {
    db_pool: PgPool,
}

impl ApplicationService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Create a draft application. Drafts can be edited freely until
    /// submission.
    pub async fn create(&self, request: CreateApplicationRequest) -> ApiResult<LoanApplication> {
        request.validate()?;

        let application = sqlx::query_as::<_, LoanApplication>(
            r#"
            INSERT INTO loan_applications (
                id, member_id, amount, loan_type, tenor_months, status,
                required_guarantors, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.member_id)
        .bind(request.amount)
        .bind(request.loan_type)
        .bind(request.tenor_months)
        .bind(ApplicationStatus::Draft)
        .bind(request.required_guarantors)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(application)
    }

    /// Submit a draft, making it visible to the consent and review stages.
    pub async fn submit(&self, id: Uuid) -> ApiResult<(LoanApplication, Vec<DomainEvent>)> {
        let current = self.get(id).await?;
        self.check_transition(&current, ApplicationStatus::Submitted)?;

        let application = sqlx::query_as::<_, LoanApplication>(
            "UPDATE loan_applications \
             SET status = $1, submitted_at = $2, updated_at = $2 \
             WHERE id = $3 AND status = $4 RETURNING *",
        )
        .bind(ApplicationStatus::Submitted)
        .bind(Utc::now())
        .bind(id)
        .bind(current.status)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::ConcurrencyConflict(format!("application {}", id)))?;

        self.record_transition(id, current.status, ApplicationStatus::Submitted)
            .await?;

        let events = vec![DomainEvent::ApplicationSubmitted {
            application_id: application.id,
            member_id: application.member_id,
            amount: application.amount,
        }];

        Ok((application, events))
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<LoanApplication> {
        sqlx::query_as::<_, LoanApplication>("SELECT * FROM loan_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))
    }

    pub async fn list(&self, query: ListApplicationsQuery) -> ApiResult<Vec<LoanApplication>> {
        let applications = sqlx::query_as::<_, LoanApplication>(
            r#"
            SELECT * FROM loan_applications
            WHERE ($1::uuid IS NULL OR member_id = $1)
              AND ($2::application_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.member_id)
        .bind(query.status)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(applications)
    }

    /// Record the committee outcome on the application.
    pub async fn set_committee_outcome(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        approved_amount: Option<i64>,
        approved_tenor_months: Option<i32>,
    ) -> ApiResult<LoanApplication> {
        let current = self.get(id).await?;
        self.check_transition(&current, status)?;

        let updated = sqlx::query_as::<_, LoanApplication>(
            "UPDATE loan_applications \
             SET status = $1, approved_amount = $2, approved_tenor_months = $3, updated_at = $4 \
             WHERE id = $5 AND status = $6 RETURNING *",
        )
        .bind(status)
        .bind(approved_amount)
        .bind(approved_tenor_months)
        .bind(Utc::now())
        .bind(id)
        .bind(current.status)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::ConcurrencyConflict(format!("application {}", id)))?;

        self.record_transition(id, current.status, status).await?;
        Ok(updated)
    }

    /// Mark an approved application as registered. Applications are
    /// immutable once registered.
    pub async fn mark_registered(&self, id: Uuid) -> ApiResult<LoanApplication> {
        let current = self.get(id).await?;
        self.check_transition(&current, ApplicationStatus::Registered)?;

        let updated = sqlx::query_as::<_, LoanApplication>(
            "UPDATE loan_applications SET status = $1, updated_at = $2 \
             WHERE id = $3 AND status = $4 RETURNING *",
        )
        .bind(ApplicationStatus::Registered)
        .bind(Utc::now())
        .bind(id)
        .bind(current.status)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::ConcurrencyConflict(format!("application {}", id)))?;

        self.record_transition(id, current.status, ApplicationStatus::Registered)
            .await?;
        Ok(updated)
    }

    /// Append to the status audit trail.
    async fn record_transition(
        &self,
        application_id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO application_status_history \
             (id, application_id, from_status, to_status, changed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Every update is conditioned on the status it was read at, so a
    /// concurrent transition loses cleanly instead of clobbering.
    fn check_transition(
        &self,
        current: &LoanApplication,
        next: ApplicationStatus,
    ) -> ApiResult<()> {
        if current.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ApiError::Conflict(format!(
                "Application {} cannot move from {:?} to {:?}",
                current.id, current.status, next
            )))
        }
    }
}
