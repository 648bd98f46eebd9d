//! Roles, permissions and categories share one set of handlers.

use super::{ApiJson, ApiPath};
use crate::{
    app_state::AppState,
    domain::{Category, ListParams, NamedInput, Page, Permission, Role},
    errors::ApiError,
    services::{CatalogEntry, CatalogService},
};
use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub fn router(state: &AppState) -> Router<AppState> {
    let admin_only = Router::new()
        .merge(resource::<Role>("/roles", true))
        .merge(resource::<Permission>("/permissions", true))
        .merge(resource::<Category>("/categories", false))
        .route_layer(state.auth.admin());

    let public = Router::new()
        .route("/categories", get(list::<Category>))
        .route("/categories/:id", get(read::<Category>));

    admin_only.merge(public)
}

/// Write routes, plus the read routes when `with_reads` is set.
fn resource<T>(path: &str, with_reads: bool) -> Router<AppState>
where
    T: CatalogEntry + Serialize,
    CatalogService<T>: FromRef<AppState>,
{
    let item = format!("{path}/:id");
    let router = Router::new();
    if with_reads {
        router
            .route(path, get(list::<T>).post(create::<T>))
            .route(&item, get(read::<T>).put(update::<T>).delete(delete::<T>))
    } else {
        router
            .route(path, post(create::<T>))
            .route(&item, put(update::<T>).delete(delete::<T>))
    }
}

#[tracing::instrument(skip(service), fields(kind = T::LABEL))]
async fn list<T>(
    State(service): State<CatalogService<T>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<T>>, ApiError>
where
    T: CatalogEntry + Serialize,
{
    let params = ListParams::parse(&query, T::listing())?;
    Ok(Json(service.list(&params).await?))
}

#[tracing::instrument(skip(service), fields(kind = T::LABEL))]
async fn read<T>(
    State(service): State<CatalogService<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<T>, ApiError>
where
    T: CatalogEntry + Serialize,
{
    Ok(Json(service.get(id).await?))
}

#[tracing::instrument(skip_all, fields(kind = T::LABEL))]
async fn create<T>(
    State(service): State<CatalogService<T>>,
    ApiJson(input): ApiJson<NamedInput>,
) -> Result<(StatusCode, Json<T>), ApiError>
where
    T: CatalogEntry + Serialize,
{
    let created = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(skip(service, input), fields(kind = T::LABEL))]
async fn update<T>(
    State(service): State<CatalogService<T>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<NamedInput>,
) -> Result<Json<T>, ApiError>
where
    T: CatalogEntry + Serialize,
{
    Ok(Json(service.update(id, input).await?))
}

#[tracing::instrument(skip(service), fields(kind = T::LABEL))]
async fn delete<T>(
    State(service): State<CatalogService<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError>
where
    T: CatalogEntry + Serialize,
{
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
