//! Consent service layer
//!
//! Token verification touches only the single consent row, so no
//! cross-application locking is needed.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::{
    live_set_state, ConsentDecision, ConsentSetState, ConsentStatus, ConsentView,
    GuarantorConsent, NominateGuarantorRequest, NominationResponse,
};
use crate::application::ApplicationStatus;
use crate::error::{ApiError, ApiResult};
use crate::events::DomainEvent;

/// Service tracking guarantor consent requests and responses
#[derive(Clone)]
pub struct ConsentService {
    db_pool: PgPool,
    validity_days: i64,
}

impl ConsentService {
    pub fn new(db_pool: PgPool, validity_days: i64) -> Self {
        Self {
            db_pool,
            validity_days,
        }
    }

    /// Nominate a guarantor, minting the single-use consent token.
    pub async fn nominate(
        &self,
        request: NominateGuarantorRequest,
    ) -> ApiResult<(NominationResponse, Vec<DomainEvent>)> {
        request.validate()?;

        let application_status: Option<ApplicationStatus> =
            sqlx::query_scalar("SELECT status FROM loan_applications WHERE id = $1")
                .bind(request.application_id)
                .fetch_optional(&self.db_pool)
                .await?;
        match application_status {
            None => {
                return Err(ApiError::NotFound(format!(
                    "Application {} not found",
                    request.application_id
                )))
            }
            // Approved applications stay open for nomination so a revoked
            // or declined guarantor can be replaced before registration.
            Some(ApplicationStatus::Submitted) | Some(ApplicationStatus::Approved) => {}
            Some(status) => {
                return Err(ApiError::Conflict(format!(
                    "Guarantors cannot be nominated once an application is {:?}",
                    status
                )))
            }
        }

        let now = Utc::now();

        // Nominating re-opens the set after a negative outcome: any live
        // negative row (including a pending one past its expiry) is marked
        // superseded so the replacement can complete the set.
        sqlx::query(
            r#"
            UPDATE guarantor_consents SET superseded_at = $2
            WHERE application_id = $1 AND superseded_at IS NULL
              AND (status IN ('declined', 'expired', 'revoked')
                   OR (status = 'pending' AND expires_at IS NOT NULL AND expires_at < $2))
            "#,
        )
        .bind(request.application_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = now + Duration::days(self.validity_days);

        let consent = sqlx::query_as::<_, GuarantorConsent>(
            r#"
            INSERT INTO guarantor_consents (
                id, application_id, guarantor_member_id, guaranteed_amount,
                token, status, requested_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.application_id)
        .bind(request.guarantor_member_id)
        .bind(request.guaranteed_amount)
        .bind(&token)
        .bind(ConsentStatus::Pending)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.db_pool)
        .await?;

        let events = vec![DomainEvent::GuarantorConsentRequested {
            application_id: consent.application_id,
            guarantor_member_id: consent.guarantor_member_id,
        }];

        Ok((
            NominationResponse {
                consent_id: consent.id,
                token,
                expires_at: consent.expires_at,
            },
            events,
        ))
    }

    /// What the guarantor sees when opening the consent link. Lazy expiry:
    /// a pending consent past its expiry is presented as expired.
    pub async fn view_by_token(&self, token: &str) -> ApiResult<ConsentView> {
        let consent = self.find_by_token(token).await?;
        let now = Utc::now();

        Ok(ConsentView {
            application_id: consent.application_id,
            guaranteed_amount: consent.guaranteed_amount,
            status: consent.effective_status(now),
            requested_at: consent.requested_at,
            expires_at: consent.expires_at,
        })
    }

    /// Record the guarantor's response. The token must match an unresolved
    /// consent; replays and stale tokens are rejected without state change.
    pub async fn respond(
        &self,
        token: &str,
        decision: ConsentDecision,
    ) -> ApiResult<(GuarantorConsent, Vec<DomainEvent>)> {
        let consent = self.find_by_token(token).await?;
        let now = Utc::now();

        match consent.effective_status(now) {
            ConsentStatus::Pending => {}
            ConsentStatus::Expired => {
                // Persist the lazily-observed expiry on this write attempt
                self.persist_status(consent.id, ConsentStatus::Pending, ConsentStatus::Expired)
                    .await?;
                return Err(ApiError::ConsentInvalid(
                    "Consent request has expired".to_string(),
                ));
            }
            status => {
                return Err(ApiError::ConsentInvalid(format!(
                    "Consent already resolved as {:?}",
                    status
                )));
            }
        }

        let next = match decision {
            ConsentDecision::Approve => ConsentStatus::Approved,
            ConsentDecision::Decline => ConsentStatus::Declined,
        };

        let updated = self
            .persist_status(consent.id, ConsentStatus::Pending, next)
            .await?
            .ok_or_else(|| {
                // Lost the race against another response or the expiry write
                ApiError::ConsentInvalid("Consent already resolved".to_string())
            })?;

        let mut events = vec![DomainEvent::GuarantorConsentResolved {
            application_id: updated.application_id,
            guarantor_member_id: updated.guarantor_member_id,
            outcome: format!("{:?}", updated.status).to_lowercase(),
        }];
        if updated.status.is_negative() {
            events.push(DomainEvent::GuarantorSetInvalidated {
                application_id: updated.application_id,
            });
        }

        Ok((updated, events))
    }

    /// Revoke a previously approved consent.
    pub async fn revoke(&self, consent_id: Uuid) -> ApiResult<(GuarantorConsent, Vec<DomainEvent>)> {
        let updated = self
            .persist_status(consent_id, ConsentStatus::Approved, ConsentStatus::Revoked)
            .await?
            .ok_or_else(|| {
                ApiError::ConsentInvalid("Only approved consents can be revoked".to_string())
            })?;

        let events = vec![
            DomainEvent::GuarantorConsentResolved {
                application_id: updated.application_id,
                guarantor_member_id: updated.guarantor_member_id,
                outcome: "revoked".to_string(),
            },
            DomainEvent::GuarantorSetInvalidated {
                application_id: updated.application_id,
            },
        ];

        Ok((updated, events))
    }

    /// State of an application's guarantor set, using effective statuses so
    /// expired-but-unwritten consents count as negative. Superseded rows
    /// (replaced after a negative outcome) are excluded.
    pub async fn set_state(&self, application_id: Uuid) -> ApiResult<ConsentSetState> {
        let consents = sqlx::query_as::<_, GuarantorConsent>(
            "SELECT * FROM guarantor_consents WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;

        let required: i32 =
            sqlx::query_scalar("SELECT required_guarantors FROM loan_applications WHERE id = $1")
                .bind(application_id)
                .fetch_optional(&self.db_pool)
                .await?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("Application {} not found", application_id))
                })?;

        Ok(live_set_state(&consents, required as usize, Utc::now()))
    }

    async fn find_by_token(&self, token: &str) -> ApiResult<GuarantorConsent> {
        sqlx::query_as::<_, GuarantorConsent>(
            "SELECT * FROM guarantor_consents WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::ConsentInvalid("Unknown consent token".to_string()))
    }

    /// Conditional status write: succeeds only if the row is still in
    /// `from`, which is what makes responses idempotent under replay.
    async fn persist_status(
        &self,
        consent_id: Uuid,
        from: ConsentStatus,
        to: ConsentStatus,
    ) -> Result<Option<GuarantorConsent>, ApiError> {
        let updated = sqlx::query_as::<_, GuarantorConsent>(
            "UPDATE guarantor_consents \
             SET status = $1, responded_at = $2 \
             WHERE id = $3 AND status = $4 RETURNING *",
        )
        .bind(to)
        .bind(Utc::now())
        .bind(consent_id)
        .bind(from)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(updated)
    }
}
