use crate::{domain::User, errors::ApiError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// The caller, as resolved by the auth layer.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin
    }

    /// Admins may act on any record; everyone else only on their own.
    pub fn may_act_for(&self, owner: Uuid) -> bool {
        self.is_admin() || self.id() == owner
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))
    }
}
