use super::{ApiJson, ApiPath};
use crate::{
    app_state::AppState,
    authentication::AuthenticatedUser,
    domain::{ListParams, Page, Redemption, Subscription, SubscriptionRequest, SubscriptionStatus},
    errors::ApiError,
    services::SubscriptionService,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use uuid::Uuid;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/subscriptions", get(list_subscriptions))
        .route_layer(state.auth.admin());

    let user = Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/mine", get(my_subscriptions))
        .route(
            "/subscriptions/:id",
            get(get_subscription)
                .put(redeem_slot)
                .delete(delete_subscription),
        )
        .route("/subscriptions/:id/status", get(subscription_status))
        .route_layer(state.auth.clone());

    user.merge(admin)
}

#[tracing::instrument(skip(subscriptions, actor, request))]
async fn create_subscription(
    State(subscriptions): State<SubscriptionService>,
    actor: Option<AuthenticatedUser>,
    ApiJson(request): ApiJson<SubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let subscription = subscriptions.create(actor.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

#[tracing::instrument(skip(subscriptions))]
async fn list_subscriptions(
    State(subscriptions): State<SubscriptionService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Subscription>>, ApiError> {
    let params = ListParams::parse(&query, &Subscription::LISTING)?;
    Ok(Json(subscriptions.list(&params).await?))
}

#[tracing::instrument(skip(subscriptions, actor))]
async fn my_subscriptions(
    State(subscriptions): State<SubscriptionService>,
    actor: AuthenticatedUser,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Subscription>>, ApiError> {
    let params = ListParams::parse(&query, &Subscription::LISTING)?;
    Ok(Json(subscriptions.list_for_user(actor.id(), &params).await?))
}

#[tracing::instrument(skip(subscriptions, actor))]
async fn get_subscription(
    State(subscriptions): State<SubscriptionService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(subscriptions.get(actor.as_ref(), id).await?))
}

#[tracing::instrument(skip(subscriptions, actor))]
async fn redeem_slot(
    State(subscriptions): State<SubscriptionService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(redemption): ApiJson<Redemption>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(
        subscriptions.update(actor.as_ref(), id, redemption).await?,
    ))
}

#[tracing::instrument(skip(subscriptions, actor))]
async fn subscription_status(
    State(subscriptions): State<SubscriptionService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SubscriptionStatus>, ApiError> {
    Ok(Json(subscriptions.status(actor.as_ref(), id).await?))
}

#[tracing::instrument(skip(subscriptions, actor))]
async fn delete_subscription(
    State(subscriptions): State<SubscriptionService>,
    actor: Option<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    subscriptions.delete(actor.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
