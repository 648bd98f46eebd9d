use super::{upload::read_form, ApiJson, ApiPath};
use crate::{
    app_state::AppState,
    domain::{ListParams, Page, Video, VideoStatus, VideoUpdate},
    errors::ApiError,
    services::VideoService,
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
            "/videos",
            post(create_video).layer(DefaultBodyLimit::max(state.uploads.max_video_bytes)),
        )
        .route("/videos/drafts", get(list_drafts))
        .route("/videos/:id", put(update_video).delete(delete_video))
        .route_layer(state.auth.admin());

    Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/:id", get(get_video))
        .merge(admin)
}

#[tracing::instrument(skip(videos))]
async fn list_videos(
    State(videos): State<VideoService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Video>>, ApiError> {
    let params = ListParams::parse(&query, &Video::LISTING)?;
    Ok(Json(videos.list(params, VideoStatus::Published).await?))
}

#[tracing::instrument(skip(videos))]
async fn list_drafts(
    State(videos): State<VideoService>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<Video>>, ApiError> {
    let params = ListParams::parse(&query, &Video::LISTING)?;
    Ok(Json(videos.list(params, VideoStatus::Draft).await?))
}

#[tracing::instrument(skip(videos))]
async fn get_video(
    State(videos): State<VideoService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Video>, ApiError> {
    Ok(Json(videos.get(id).await?))
}

#[tracing::instrument(skip_all)]
async fn create_video(
    State(videos): State<VideoService>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    let form = read_form(multipart).await?;
    let video = videos.create(form).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

#[tracing::instrument(skip(videos, update))]
async fn update_video(
    State(videos): State<VideoService>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<VideoUpdate>,
) -> Result<Json<Video>, ApiError> {
    Ok(Json(videos.update(id, update).await?))
}

#[tracing::instrument(skip(videos))]
async fn delete_video(
    State(videos): State<VideoService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    videos.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
