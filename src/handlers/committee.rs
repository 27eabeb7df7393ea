//! Committee review handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::committee::{AggregateOutcome, CommitteeReview, SubmitReviewRequest};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignReviewerRequest {
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReviewSubmissionResponse {
    pub review: CommitteeReview,
    pub aggregate: AggregateOutcome,
}

#[derive(Debug, Serialize)]
pub struct CommitteeStatusResponse {
    pub reviews: Vec<CommitteeReview>,
    pub aggregate: AggregateOutcome,
}

pub async fn assign_reviewer(
    State(app_state): State<AppState>,
    Json(request): Json<AssignReviewerRequest>,
) -> ApiResult<Json<CommitteeReview>> {
    let review = app_state
        .committee
        .assign_reviewer(request.application_id, request.reviewer_id)
        .await?;
    Ok(Json(review))
}

pub async fn submit_review(
    State(app_state): State<AppState>,
    Json(request): Json<SubmitReviewRequest>,
) -> ApiResult<Json<ReviewSubmissionResponse>> {
    let (review, aggregate, events) = app_state.committee.submit_review(request).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(ReviewSubmissionResponse { review, aggregate }))
}

pub async fn get_committee_status(
    State(app_state): State<AppState>,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<CommitteeStatusResponse>> {
    let reviews = app_state.committee.list_reviews(application_id).await?;
    let aggregate = app_state.committee.current_aggregate(application_id).await?;
    Ok(Json(CommitteeStatusResponse { reviews, aggregate }))
}
