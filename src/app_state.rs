use crate::{
    authentication::RequireAuthLayer,
    configuration::UploadSettings,
    domain::{Category, Permission, Role},
    services::{
        BroadcastService, CatalogService, IssueService, SubscriptionService, UserService,
        VideoService,
    },
};
use axum::extract::FromRef;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub users: UserService,
    pub categories: CatalogService<Category>,
    pub permissions: CatalogService<Permission>,
    pub roles: CatalogService<Role>,
    pub issues: IssueService,
    pub videos: VideoService,
    pub subscriptions: SubscriptionService,
    pub broadcasts: BroadcastService,
    pub auth: RequireAuthLayer,
    pub uploads: UploadSettings,
}
