use super::ApiJson;
use crate::{
    app_state::AppState,
    domain::{Broadcast, ListParams, Page, WebhookEvent},
    errors::ApiError,
    services::{BroadcastService, EventOutcome},
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/broadcasts", get(list_broadcasts))
        .route_layer(state.auth.admin());

    Router::new()
        .route("/broadcasts/webhook", post(receive_event))
        .route("/broadcasts/active", get(active_broadcast))
        .merge(admin)
}

#[derive(Serialize)]
struct WebhookResponse {
    outcome: &'static str,
    broadcast: Option<Broadcast>,
}

impl From<EventOutcome> for WebhookResponse {
    fn from(outcome: EventOutcome) -> Self {
        let (outcome, broadcast) = match outcome {
            EventOutcome::Ignored => ("ignored", None),
            EventOutcome::Created(b) => ("created", Some(b)),
            EventOutcome::Updated(b) => ("updated", Some(b)),
            EventOutcome::Archived(b) => ("archived", Some(b)),
        };
        Self { outcome, broadcast }
    }
}

#[tracing::instrument(skip_all)]
async fn receive_event(
    State(broadcasts): State<BroadcastService>,
    ApiJson(event): ApiJson<WebhookEvent>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let outcome = broadcasts.handle_event(event).await?;
    Ok(Json(outcome.into()))
}

#[tracing::instrument(skip(broadcasts))]
async fn list_broadcasts(
    State(broadcasts): State<BroadcastService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Broadcast>>, ApiError> {
    let params = ListParams::parse(&query, &Broadcast::LISTING)?;
    Ok(Json(broadcasts.list(&params).await?))
}

#[tracing::instrument(skip(broadcasts))]
async fn active_broadcast(
    State(broadcasts): State<BroadcastService>,
) -> Result<Json<Option<Broadcast>>, ApiError> {
    Ok(Json(broadcasts.active().await?))
}
