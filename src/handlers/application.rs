//! Loan application handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::application::{CreateApplicationRequest, ListApplicationsQuery, LoanApplication};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_application(
    State(app_state): State<AppState>,
    Json(request): Json<CreateApplicationRequest>,
) -> ApiResult<(StatusCode, Json<LoanApplication>)> {
    let application = app_state.applications.create(request).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn submit_application(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanApplication>> {
    let (application, events) = app_state.applications.submit(id).await?;
    app_state.notifier.publish_detached(events);
    Ok(Json(application))
}

pub async fn get_application(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanApplication>> {
    let application = app_state.applications.get(id).await?;
    Ok(Json(application))
}

pub async fn list_applications(
    State(app_state): State<AppState>,
    Query(query): Query<ListApplicationsQuery>,
) -> ApiResult<Json<Vec<LoanApplication>>> {
    let applications = app_state.applications.list(query).await?;
    Ok(Json(applications))
}
