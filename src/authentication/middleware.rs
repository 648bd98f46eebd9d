use super::{extract::AuthenticatedUser, token::TokenIssuer};
use crate::{errors::ApiError, repository::UserRepository};
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    response::{IntoResponse, Response},
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    User,
    Admin,
}

/// Resolves the bearer token into an [`AuthenticatedUser`] request extension.
///
/// Without `enforce`, requests carrying no token pass through anonymously;
/// a token that is present is always checked.
#[derive(Clone)]
pub struct RequireAuthLayer {
    tokens: TokenIssuer,
    users: Arc<dyn UserRepository>,
    enforce: bool,
    access: Access,
}

impl RequireAuthLayer {
    pub fn new(
        tokens: TokenIssuer,
        users: Arc<dyn UserRepository>,
        enforce: bool,
        access: Access,
    ) -> Self {
        Self {
            tokens,
            users,
            enforce,
            access,
        }
    }

    /// The same layer, restricted to administrators.
    pub fn admin(&self) -> Self {
        Self {
            access: Access::Admin,
            ..self.clone()
        }
    }
}

impl<S> Layer<S> for RequireAuthLayer {
    type Service = RequireAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAuth {
            inner,
            config: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequireAuth<S> {
    inner: S,
    config: RequireAuthLayer,
}

enum Outcome {
    Anonymous,
    Authenticated(AuthenticatedUser),
    Rejected(ApiError),
}

impl RequireAuthLayer {
    async fn authenticate(&self, header: Option<&str>) -> Outcome {
        let Some(header) = header else {
            return if self.enforce {
                Outcome::Rejected(ApiError::Unauthorized("Missing bearer token".into()))
            } else {
                Outcome::Anonymous
            };
        };

        let Some(token) = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Outcome::Rejected(ApiError::Unauthorized(
                "Malformed authorization header".into(),
            ));
        };

        let claims = match self.tokens.decode(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::info!(error.message = %e, "Rejected bearer token");
                return Outcome::Rejected(ApiError::Unauthorized("Invalid token".into()));
            }
        };

        let user = match self.users.find(claims.sub).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Outcome::Rejected(ApiError::Unauthorized("User no longer exists".into()))
            }
            Err(e) => return Outcome::Rejected(ApiError::Unexpected(e)),
        };

        if self.access == Access::Admin && !user.is_admin && self.enforce {
            return Outcome::Rejected(ApiError::Forbidden(
                "Administrator access required".into(),
            ));
        }

        Outcome::Authenticated(AuthenticatedUser(user))
    }
}

impl<S> Service<Request<Body>> for RequireAuth<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_span = tracing::Span::current();
        let span = tracing::info_span!("Authenticate", access = ?self.config.access);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        Box::pin(
            async move {
                let header = req
                    .headers()
                    .get(AUTHORIZATION)
                    .map(|v| v.to_str().unwrap_or_default().to_owned());

                match config.authenticate(header.as_deref()).await {
                    Outcome::Anonymous => {}
                    Outcome::Authenticated(user) => {
                        request_span.record("user_id", tracing::field::display(user.id()));
                        req.extensions_mut().insert(user);
                    }
                    Outcome::Rejected(error) => return Ok(error.into_response()),
                }

                inner.call(req).await
            }
            .instrument(span),
        )
    }
}
