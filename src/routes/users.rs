use super::{ApiJson, ApiPath};
use crate::{
    app_state::AppState,
    authentication::AuthenticatedUser,
    domain::{ListParams, Page, PasswordChange, ProfileUpdate, User},
    errors::ApiError,
    services::UserService,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use std::collections::HashMap;
use uuid::Uuid;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/users", get(list_users))
        .route_layer(state.auth.admin());

    Router::new()
        .route("/users/me", get(me))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/password", put(change_password))
        .route_layer(state.auth.clone())
        .merge(admin)
}

#[tracing::instrument(skip(users))]
async fn list_users(
    State(users): State<UserService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<User>>, ApiError> {
    let params = ListParams::parse(&query, &User::LISTING)?;
    Ok(Json(users.list(&params).await?))
}

#[tracing::instrument(skip_all)]
async fn me(
    State(users): State<UserService>,
    actor: AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(users.get(Some(&actor), actor.id()).await?))
}

#[tracing::instrument(skip(users, actor))]
async fn get_user(
    State(users): State<UserService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(users.get(actor.as_ref(), id).await?))
}

#[tracing::instrument(skip(users, actor, update))]
async fn update_user(
    State(users): State<UserService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(users.update_profile(actor.as_ref(), id, update).await?))
}

#[tracing::instrument(skip(users, actor, change))]
async fn change_password(
    State(users): State<UserService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    users.change_password(actor.as_ref(), id, change).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(users, actor))]
async fn delete_user(
    State(users): State<UserService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    users.delete(actor.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
