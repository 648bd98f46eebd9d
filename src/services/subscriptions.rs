use super::ensure_owner;
use crate::{
    authentication::AuthenticatedUser,
    domain::{ListParams, Page, Redemption, Subscription, SubscriptionRequest, SubscriptionStatus},
    errors::ApiError,
    repository::{SubscriptionRepository, UserRepository},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserRepository>,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            subscriptions,
            users,
        }
    }

    /// Records a purchase for the caller, or for `request.user` when an
    /// administrator buys on somebody's behalf.
    #[tracing::instrument(
        name = "Create subscription",
        skip(self, actor),
        fields(owner = tracing::field::Empty)
    )]
    pub async fn create(
        &self,
        actor: Option<&AuthenticatedUser>,
        request: SubscriptionRequest,
    ) -> Result<Subscription, ApiError> {
        let owner = match (actor, request.user) {
            (Some(actor), Some(user)) if actor.is_admin() => user,
            (Some(actor), _) => actor.id(),
            (None, Some(user)) => user,
            (None, None) => return Err(ApiError::validation("user", "User is required.")),
        };
        tracing::Span::current().record("owner", tracing::field::display(owner));

        if self.users.find(owner).await?.is_none() {
            return Err(ApiError::not_found("User"));
        }

        let subscription = Subscription::purchase(owner, request, OffsetDateTime::now_utc())
            .map_err(|msg| ApiError::rule("subscription", msg))?;
        self.subscriptions.insert(&subscription).await?;

        Ok(subscription)
    }

    /// Unlocks one more content item. Ids already present are appended again.
    #[tracing::instrument(name = "Redeem subscription slot", skip(self, actor))]
    pub async fn update(
        &self,
        actor: Option<&AuthenticatedUser>,
        id: Uuid,
        redemption: Redemption,
    ) -> Result<Subscription, ApiError> {
        let mut subscription = self.get(actor, id).await?;

        subscription
            .redeem(redemption.id)
            .map_err(|msg| ApiError::rule(redemption.id.to_string(), msg))?;
        self.subscriptions.update(&subscription).await?;

        Ok(subscription)
    }

    #[tracing::instrument(name = "Get subscription status", skip(self, actor))]
    pub async fn status(
        &self,
        actor: Option<&AuthenticatedUser>,
        id: Uuid,
    ) -> Result<SubscriptionStatus, ApiError> {
        let subscription = self.get(actor, id).await?;
        Ok(subscription.status(OffsetDateTime::now_utc()))
    }

    #[tracing::instrument(name = "Get subscription", skip(self, actor))]
    pub async fn get(
        &self,
        actor: Option<&AuthenticatedUser>,
        id: Uuid,
    ) -> Result<Subscription, ApiError> {
        let subscription = self
            .subscriptions
            .find(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Subscription"))?;
        ensure_owner(actor, subscription.user_id)?;
        Ok(subscription)
    }

    #[tracing::instrument(name = "List subscriptions", skip(self))]
    pub async fn list(&self, params: &ListParams) -> Result<Page<Subscription>, ApiError> {
        Ok(self.subscriptions.list(params).await?)
    }

    #[tracing::instrument(name = "List user subscriptions", skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &ListParams,
    ) -> Result<Page<Subscription>, ApiError> {
        Ok(self.subscriptions.list_for_user(user_id, params).await?)
    }

    #[tracing::instrument(name = "Delete subscription", skip(self, actor))]
    pub async fn delete(&self, actor: Option<&AuthenticatedUser>, id: Uuid) -> Result<(), ApiError> {
        self.get(actor, id).await?;
        self.subscriptions.delete(id).await?;
        Ok(())
    }
}
