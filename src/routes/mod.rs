//! HTTP bindings. Every resource lives under [`API_PREFIX`].

pub mod auth;
pub mod broadcasts;
pub mod catalog;
pub mod health_check;
pub mod issues;
pub mod subscriptions;
pub mod upload;
pub mod users;
pub mod videos;

use crate::errors::ApiError;
use axum::{
    extract::{FromRequest, FromRequestParts, Path},
    Json,
};

pub const API_PREFIX: &str = "/api/v1";

/// Collections whose listings go through the response cache.
pub const CACHED_COLLECTIONS: [&str; 3] = ["issues", "videos", "categories"];

/// JSON body whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
