//! Business rules. Each service composes repositories and adapters and
//! answers with [`ApiError`] response codes.

mod broadcasts;
mod catalog;
mod issues;
mod subscriptions;
mod users;
mod videos;

pub use broadcasts::{BroadcastService, EventOutcome};
pub use catalog::{CatalogEntry, CatalogService};
pub use issues::IssueService;
pub use subscriptions::SubscriptionService;
pub use users::{Session, UserService, PASSWORD_RESET_TAG};
pub use videos::VideoService;

use crate::{authentication::AuthenticatedUser, errors::ApiError};
use uuid::Uuid;

/// Callers may act on what they own, administrators on anything. Without a
/// caller (authentication disabled) every action is allowed.
pub(crate) fn ensure_owner(actor: Option<&AuthenticatedUser>, owner: Uuid) -> Result<(), ApiError> {
    match actor {
        Some(actor) if !actor.may_act_for(owner) => Err(ApiError::Forbidden(
            "You may only access your own records".into(),
        )),
        _ => Ok(()),
    }
}

/// Trimmed, non-empty title of an uploaded or updated piece of content.
pub(crate) fn required_title(raw: Option<&str>) -> Result<String, ApiError> {
    match raw.map(str::trim) {
        Some(title) if !title.is_empty() => Ok(title.to_string()),
        _ => Err(ApiError::validation("title", "Title is required.")),
    }
}
