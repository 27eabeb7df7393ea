//! Guarantor consent handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::consent::{
    ConsentResponseRequest, ConsentView, GuarantorConsent, NominateGuarantorRequest,
    NominationResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Nominate a guarantor and mint the consent token. The token appears in
/// this response only.
pub async fn nominate_guarantor(
    State(app_state): State<AppState>,
    Json(request): Json<NominateGuarantorRequest>,
) -> ApiResult<(StatusCode, Json<NominationResponse>)> {
    let (response, events) = app_state.consents.nominate(request).await?;
    app_state.notifier.publish_detached(events);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn view_consent(
    State(app_state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<ConsentView>> {
    let view = app_state.consents.view_by_token(&token).await?;
    Ok(Json(view))
}

pub async fn respond_to_consent(
    State(app_state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<ConsentResponseRequest>,
) -> ApiResult<Json<GuarantorConsent>> {
    let (consent, events) = app_state.consents.respond(&token, request.decision).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(consent))
}

pub async fn revoke_consent(
    State(app_state): State<AppState>,
    Path(consent_id): Path<Uuid>,
) -> ApiResult<Json<GuarantorConsent>> {
    let (consent, events) = app_state.consents.revoke(consent_id).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(consent))
}
