use super::{upload::read_form, ApiJson, ApiPath};
use crate::{
    app_state::AppState,
    domain::{Issue, IssueUpdate, ListParams, Page},
    errors::ApiError,
    services::IssueService,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use std::collections::HashMap;
use uuid::Uuid;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route(
            "/issues",
            post(create_issue).layer(DefaultBodyLimit::max(state.uploads.max_issue_bytes)),
        )
        .route("/issues/:id", put(update_issue).delete(delete_issue))
        .route_layer(state.auth.admin());

    Router::new()
        .route("/issues", get(list_issues))
        .route("/issues/:id", get(get_issue))
        .merge(admin)
}

#[tracing::instrument(skip(issues))]
async fn list_issues(
    State(issues): State<IssueService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Issue>>, ApiError> {
    let params = ListParams::parse(&query, &Issue::LISTING)?;
    Ok(Json(issues.list(&params).await?))
}

#[tracing::instrument(skip(issues))]
async fn get_issue(
    State(issues): State<IssueService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Issue>, ApiError> {
    Ok(Json(issues.get(id).await?))
}

#[tracing::instrument(skip_all)]
async fn create_issue(
    State(issues): State<IssueService>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Issue>), ApiError> {
    let form = read_form(multipart).await?;
    let issue = issues.create(form).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

#[tracing::instrument(skip(issues, update))]
async fn update_issue(
    State(issues): State<IssueService>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<IssueUpdate>,
) -> Result<Json<Issue>, ApiError> {
    Ok(Json(issues.update(id, update).await?))
}

#[tracing::instrument(skip(issues))]
async fn delete_issue(
    State(issues): State<IssueService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    issues.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
