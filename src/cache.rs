//! Response cache for the public collection endpoints.
//!
//! Successful `GET` responses of a cached collection are stored under
//! `path?query` for a fixed time. Any successful write below the collection
//! path drops every entry of that collection.

use crate::{domain::CachedResponse, repository::CacheRepository};
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, HeaderValue, Method, Request, StatusCode},
    response::Response,
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use time::OffsetDateTime;
use tower::{Layer, Service};
use tracing::Instrument;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// The cached pages of one collection, for writes that do not go through
/// a request the layer sees.
#[derive(Clone)]
pub struct CollectionCache {
    cache: Arc<dyn CacheRepository>,
    collection: String,
}

impl CollectionCache {
    pub fn new(cache: Arc<dyn CacheRepository>, collection: impl Into<String>) -> Self {
        Self {
            cache,
            collection: collection.into(),
        }
    }

    /// Failures are logged: a stale entry only lives until its TTL.
    pub async fn invalidate(&self) {
        let collection = self.collection.as_str();
        match self.cache.invalidate_prefix(collection).await {
            Ok(dropped) => tracing::debug!(%collection, dropped, "Invalidated cache"),
            Err(e) => {
                tracing::warn!(error.cause_chain = ?e, %collection, "Failed to invalidate the cache")
            }
        }
    }
}

#[derive(Clone)]
pub struct ResponseCacheLayer {
    cache: Arc<dyn CacheRepository>,
    ttl: time::Duration,
    collections: Arc<[String]>,
}

impl ResponseCacheLayer {
    /// `collections` are full paths, e.g. `/api/v1/issues`.
    pub fn new(
        cache: Arc<dyn CacheRepository>,
        ttl: std::time::Duration,
        collections: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            cache,
            ttl: time::Duration::try_from(ttl).unwrap_or(time::Duration::ZERO),
            collections: collections.into_iter().collect(),
        }
    }

    fn is_cached(&self, path: &str) -> bool {
        self.collections.iter().any(|c| c == path)
    }

    fn owning_collection(&self, path: &str) -> Option<&str> {
        self.collections
            .iter()
            .find(|c| {
                path.strip_prefix(c.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .map(String::as_str)
    }
}

impl<S> Layer<S> for ResponseCacheLayer {
    type Service = ResponseCache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseCache {
            inner,
            config: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ResponseCache<S> {
    inner: S,
    config: ResponseCacheLayer,
}

impl<S> Service<Request<Body>> for ResponseCache<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        let path = req.uri().path().to_owned();
        if req.method() == Method::GET {
            if !config.is_cached(&path) {
                return Box::pin(inner.call(req));
            }
            let key = match req.uri().query() {
                Some(query) => format!("{path}?{query}"),
                None => path,
            };
            let span = tracing::info_span!("Response cache", cache_key = %key);

            return Box::pin(
                async move {
                    let now = OffsetDateTime::now_utc();
                    match config.cache.get(&key, now).await {
                        Ok(Some(entry)) => return Ok(cached_response(entry)),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error.cause_chain = ?e, "Failed to read the cache"),
                    }

                    let response = inner.call(req).await?;
                    if response.status() != StatusCode::OK {
                        return Ok(response);
                    }
                    Ok(store(&config, key, response, now).await)
                }
                .instrument(span),
            );
        }

        let Some(collection) = config.owning_collection(&path).map(str::to_owned) else {
            return Box::pin(inner.call(req));
        };
        let collection = CollectionCache::new(config.cache.clone(), collection);
        Box::pin(async move {
            let response = inner.call(req).await?;
            if response.status().is_success() {
                collection.invalidate().await;
            }
            Ok(response)
        })
    }
}

fn cached_response(entry: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(entry.body));
    if let Some(value) = entry
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("hit"));
    response
}

async fn store(
    config: &ResponseCacheLayer,
    key: String,
    response: Response,
    now: OffsetDateTime,
) -> Response {
    let (mut parts, body) = response.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, "Failed to buffer the response body");
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap_or_default();
        }
    };

    let entry = CachedResponse {
        key,
        content_type: parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: body.to_vec(),
        expires_at: now + config.ttl,
    };
    if let Err(e) = config.cache.put(&entry).await {
        tracing::warn!(error.cause_chain = ?e, "Failed to store the response in the cache");
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(body))
}
