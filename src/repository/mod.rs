//! Query layer: one trait per stored entity, with Postgres and in-memory backends.
//!
//! Lookups return `Ok(None)` when the record does not exist; errors are
//! reserved for storage failures.

mod memory;
mod postgres;

pub use memory::InMemory;
pub use postgres::Postgres;

use crate::domain::{
    Broadcast, CachedResponse, Category, Code, Issue, ListParams, Page, Permission, Role,
    Subscription, Transaction, User, Video,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<User>>;

    async fn update(&self, user: &User) -> anyhow::Result<()>;

    /// Removes the user together with their subscriptions and reset codes.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

/// Storage of a simple named entity whose name is unique.
#[async_trait]
pub trait CatalogRepository<T>: Send + Sync {
    async fn insert(&self, item: &T) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<T>>;

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<T>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<T>>;

    async fn update(&self, item: &T) -> anyhow::Result<()>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

pub type CategoryRepository = dyn CatalogRepository<Category>;
pub type PermissionRepository = dyn CatalogRepository<Permission>;
pub type RoleRepository = dyn CatalogRepository<Role>;

#[async_trait]
pub trait IssueRepository: Send + Sync {
    async fn insert(&self, issue: &Issue) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Issue>>;

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Issue>>;

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Issue>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Issue>>;

    async fn update(&self, issue: &Issue) -> anyhow::Result<()>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// One past the highest display order in use.
    async fn next_order(&self) -> anyhow::Result<i32>;

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn insert(&self, video: &Video) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Video>>;

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Video>>;

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Video>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Video>>;

    async fn update(&self, video: &Video) -> anyhow::Result<()>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> anyhow::Result<()>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Subscription>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Subscription>>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &ListParams,
    ) -> anyhow::Result<Page<Subscription>>;

    async fn update(&self, subscription: &Subscription) -> anyhow::Result<()>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait BroadcastRepository: Send + Sync {
    async fn insert(&self, broadcast: &Broadcast) -> anyhow::Result<()>;

    async fn find_active(&self) -> anyhow::Result<Option<Broadcast>>;

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Broadcast>>;

    async fn update(&self, broadcast: &Broadcast) -> anyhow::Result<()>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Stores the code, replacing any earlier code of the same user.
    async fn upsert(&self, code: &Code) -> anyhow::Result<()>;

    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<Code>>;

    async fn delete(&self, user_id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, transaction: &Transaction) -> anyhow::Result<()>;

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Transaction>>;
}

#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// The entry stored under `key`, if it is still fresh at `now`.
    async fn get(&self, key: &str, now: OffsetDateTime) -> anyhow::Result<Option<CachedResponse>>;

    async fn put(&self, entry: &CachedResponse) -> anyhow::Result<()>;

    /// Drops every entry whose key starts with `prefix`.
    async fn invalidate_prefix(&self, prefix: &str) -> anyhow::Result<u64>;
}

/// Every repository the application uses, built once at start-up.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<CategoryRepository>,
    pub permissions: Arc<PermissionRepository>,
    pub roles: Arc<RoleRepository>,
    pub issues: Arc<dyn IssueRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub broadcasts: Arc<dyn BroadcastRepository>,
    pub codes: Arc<dyn CodeRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub cache: Arc<dyn CacheRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_backend(Arc::new(Postgres::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemory::default()))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepository
            + CatalogRepository<Category>
            + CatalogRepository<Permission>
            + CatalogRepository<Role>
            + IssueRepository
            + VideoRepository
            + SubscriptionRepository
            + BroadcastRepository
            + CodeRepository
            + TransactionRepository
            + CacheRepository
            + 'static,
    {
        Self {
            users: backend.clone(),
            categories: backend.clone(),
            permissions: backend.clone(),
            roles: backend.clone(),
            issues: backend.clone(),
            videos: backend.clone(),
            subscriptions: backend.clone(),
            broadcasts: backend.clone(),
            codes: backend.clone(),
            transactions: backend.clone(),
            cache: backend,
        }
    }
}
