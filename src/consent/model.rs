//! Guarantor consent models and state machine
//!
//! One row per (application, guarantor). Transitions are one-way except
//! Revoked, which is reachable only from Approved. Expiry is computed at
//! creation and enforced lazily on read. A negative outcome invalidates the
//! whole set until nomination re-opens; the replaced rows are then marked
//! superseded and stop counting toward completeness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Consent status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "consent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Declined,
    Expired,
    Revoked,
}

impl ConsentStatus {
    pub fn can_transition_to(self, next: ConsentStatus) -> bool {
        use ConsentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Declined)
                | (Pending, Expired)
                | (Pending, Revoked)
                | (Approved, Revoked)
        )
    }

    /// A terminal negative outcome invalidates the whole guarantor set.
    pub fn is_negative(self) -> bool {
        use ConsentStatus::*;
        matches!(self, Declined | Expired | Revoked)
    }
}

/// Guarantor consent row
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct GuarantorConsent {
    pub id: Uuid,
    pub application_id: Uuid,
    pub guarantor_member_id: Uuid,
    pub guaranteed_amount: i64,
    /// Opaque single-use token binding the guarantor's response to this
    /// request. Never included in API responses except at mint time.
    #[serde(skip_serializing)]
    pub token: String,
    pub status: ConsentStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set once a replacement guarantor was nominated after this consent
    /// went negative; a superseded row no longer counts toward the set.
    pub superseded_at: Option<DateTime<Utc>>,
}

impl GuarantorConsent {
    /// Status as presented to readers: a Pending consent past its expiry is
    /// already Expired even if no write has happened yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ConsentStatus {
        match (self.status, self.expires_at) {
            (ConsentStatus::Pending, Some(expires_at)) if now > expires_at => {
                ConsentStatus::Expired
            }
            (status, _) => status,
        }
    }
}

/// Completeness of an application's guarantor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentSetState {
    /// All required consents approved, none negative
    Complete,
    /// Still waiting on pending consents
    Pending,
    /// At least one declined/expired/revoked consent; nomination must
    /// re-open
    Invalidated,
}

/// Derive the set state from the full consent rows. Superseded rows are
/// ignored, so a declined guarantor who has been replaced no longer blocks
/// the set.
pub fn live_set_state(
    consents: &[GuarantorConsent],
    required: usize,
    now: DateTime<Utc>,
) -> ConsentSetState {
    let statuses: Vec<ConsentStatus> = consents
        .iter()
        .filter(|c| c.superseded_at.is_none())
        .map(|c| c.effective_status(now))
        .collect();
    consent_set_state(&statuses, required)
}

/// Derive the state of a guarantor set from its effective statuses.
pub fn consent_set_state(statuses: &[ConsentStatus], required: usize) -> ConsentSetState {
    if statuses.iter().any(|s| s.is_negative()) {
        return ConsentSetState::Invalidated;
    }
    let approved = statuses
        .iter()
        .filter(|s| **s == ConsentStatus::Approved)
        .count();
    if approved >= required {
        ConsentSetState::Complete
    } else {
        ConsentSetState::Pending
    }
}

/// Guarantor nomination request
#[derive(Debug, Deserialize, Validate)]
pub struct NominateGuarantorRequest {
    pub application_id: Uuid,
    pub guarantor_member_id: Uuid,
    #[validate(range(min = 1))]
    pub guaranteed_amount: i64,
}

/// Response minted for a nomination; the token is returned exactly once.
#[derive(Debug, Serialize)]
pub struct NominationResponse {
    pub consent_id: Uuid,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Guarantor's answer to a consent request
#[derive(Debug, Deserialize)]
pub struct ConsentResponseRequest {
    pub decision: ConsentDecision,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsentDecision {
    Approve,
    Decline,
}

/// What a guarantor sees when opening their consent link
#[derive(Debug, Serialize)]
pub struct ConsentView {
    pub application_id: Uuid,
    pub guaranteed_amount: i64,
    pub status: ConsentStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
