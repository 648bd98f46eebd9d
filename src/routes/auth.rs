use super::ApiJson;
use crate::{
    app_state::AppState,
    domain::{ForgotPassword, ResetPassword, SignIn, SignUp, User},
    errors::ApiError,
    services::{Session, UserService},
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset", post(reset_password))
}

#[tracing::instrument(skip_all)]
async fn sign_up(
    State(users): State<UserService>,
    ApiJson(form): ApiJson<SignUp>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = users.sign_up(form).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[tracing::instrument(skip_all)]
async fn sign_in(
    State(users): State<UserService>,
    ApiJson(form): ApiJson<SignIn>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(users.sign_in(form).await?))
}

/// Always answers 200 so that registered addresses cannot be probed.
#[tracing::instrument(skip_all)]
async fn forgot_password(
    State(users): State<UserService>,
    ApiJson(form): ApiJson<ForgotPassword>,
) -> Result<StatusCode, ApiError> {
    users.request_password_reset(form).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip_all)]
async fn reset_password(
    State(users): State<UserService>,
    ApiJson(form): ApiJson<ResetPassword>,
) -> Result<StatusCode, ApiError> {
    users.reset_password(form).await?;
    Ok(StatusCode::OK)
}
