use super::{
    BroadcastRepository, CacheRepository, CatalogRepository, CodeRepository, IssueRepository,
    SubscriptionRepository, TransactionRepository, UserRepository, VideoRepository,
};
use crate::domain::{
    listing::paginate, Broadcast, CachedResponse, Category, Code, Issue, ListParams, Page,
    Permission, Role, Subscription, Transaction, User, Video,
};
use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

type Table<T> = RwLock<HashMap<Uuid, T>>;

/// Process-local backend with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct InMemory {
    users: Table<User>,
    categories: Table<Category>,
    permissions: Table<Permission>,
    roles: Table<Role>,
    issues: Table<Issue>,
    videos: Table<Video>,
    subscriptions: Table<Subscription>,
    broadcasts: Table<Broadcast>,
    codes: Table<Code>,
    transactions: RwLock<Vec<Transaction>>,
    cache: RwLock<HashMap<String, CachedResponse>>,
}

async fn replace<T>(table: &Table<T>, id: Uuid, item: &T) -> anyhow::Result<()>
where
    T: Clone,
{
    match table.write().await.get_mut(&id) {
        Some(existing) => {
            *existing = item.clone();
            Ok(())
        }
        None => bail!("record {id} does not exist"),
    }
}

#[async_trait]
impl UserRepository for InMemory {
    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            bail!("a user with email {} already exists", user.email);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<User>> {
        Ok(paginate(self.users.read().await.values(), params))
    }

    async fn update(&self, user: &User) -> anyhow::Result<()> {
        if self
            .users
            .read()
            .await
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            bail!("a user with email {} already exists", user.email);
        }
        replace(&self.users, user.id, user).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let removed = self.users.write().await.remove(&id).is_some();
        if removed {
            self.subscriptions
                .write()
                .await
                .retain(|_, s| s.user_id != id);
            self.codes.write().await.remove(&id);
        }
        Ok(removed)
    }
}

macro_rules! catalog_repository {
    ($entity:ty, $table:ident) => {
        #[async_trait]
        impl CatalogRepository<$entity> for InMemory {
            async fn insert(&self, item: &$entity) -> anyhow::Result<()> {
                let mut table = self.$table.write().await;
                if table.values().any(|t| t.name == item.name) {
                    bail!("`{}` already exists", item.name);
                }
                table.insert(item.id, item.clone());
                Ok(())
            }

            async fn find(&self, id: Uuid) -> anyhow::Result<Option<$entity>> {
                Ok(self.$table.read().await.get(&id).cloned())
            }

            async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<$entity>> {
                Ok(self
                    .$table
                    .read()
                    .await
                    .values()
                    .find(|t| t.name == name)
                    .cloned())
            }

            async fn list(&self, params: &ListParams) -> anyhow::Result<Page<$entity>> {
                Ok(paginate(self.$table.read().await.values(), params))
            }

            async fn update(&self, item: &$entity) -> anyhow::Result<()> {
                if self
                    .$table
                    .read()
                    .await
                    .values()
                    .any(|t| t.name == item.name && t.id != item.id)
                {
                    bail!("`{}` already exists", item.name);
                }
                replace(&self.$table, item.id, item).await
            }

            async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
                Ok(self.$table.write().await.remove(&id).is_some())
            }
        }
    };
}

catalog_repository!(Category, categories);
catalog_repository!(Permission, permissions);
catalog_repository!(Role, roles);

#[async_trait]
impl IssueRepository for InMemory {
    async fn insert(&self, issue: &Issue) -> anyhow::Result<()> {
        let mut issues = self.issues.write().await;
        if issues
            .values()
            .any(|i| i.title == issue.title || i.key == issue.key || i.order == issue.order)
        {
            bail!("issue `{}` collides with an existing issue", issue.title);
        }
        issues.insert(issue.id, issue.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Issue>> {
        Ok(self.issues.read().await.get(&id).cloned())
    }

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Issue>> {
        Ok(self
            .issues
            .read()
            .await
            .values()
            .find(|i| i.title == title)
            .cloned())
    }

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Issue>> {
        Ok(self
            .issues
            .read()
            .await
            .values()
            .find(|i| i.key == key)
            .cloned())
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Issue>> {
        Ok(paginate(self.issues.read().await.values(), params))
    }

    async fn update(&self, issue: &Issue) -> anyhow::Result<()> {
        if self
            .issues
            .read()
            .await
            .values()
            .any(|i| i.id != issue.id && (i.key == issue.key || i.title == issue.title))
        {
            bail!("issue `{}` collides with an existing issue", issue.title);
        }
        replace(&self.issues, issue.id, issue).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.issues.write().await.remove(&id).is_some())
    }

    async fn next_order(&self) -> anyhow::Result<i32> {
        let max = self.issues.read().await.values().map(|i| i.order).max();
        Ok(max.map_or(1, |order| order + 1))
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(issue) = self.issues.write().await.get_mut(&id) {
            issue.views += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for InMemory {
    async fn insert(&self, video: &Video) -> anyhow::Result<()> {
        let mut videos = self.videos.write().await;
        if videos
            .values()
            .any(|v| v.title == video.title || v.key == video.key)
        {
            bail!("video `{}` already exists", video.title);
        }
        videos.insert(video.id, video.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Video>> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Video>> {
        Ok(self
            .videos
            .read()
            .await
            .values()
            .find(|v| v.title == title)
            .cloned())
    }

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Video>> {
        Ok(self
            .videos
            .read()
            .await
            .values()
            .find(|v| v.key == key)
            .cloned())
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Video>> {
        Ok(paginate(self.videos.read().await.values(), params))
    }

    async fn update(&self, video: &Video) -> anyhow::Result<()> {
        if self
            .videos
            .read()
            .await
            .values()
            .any(|v| v.id != video.id && (v.key == video.key || v.title == video.title))
        {
            bail!("video `{}` collides with an existing video", video.title);
        }
        replace(&self.videos, video.id, video).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.videos.write().await.remove(&id).is_some())
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(video) = self.videos.write().await.get_mut(&id) {
            video.views += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemory {
    async fn insert(&self, subscription: &Subscription) -> anyhow::Result<()> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Subscription>> {
        Ok(paginate(self.subscriptions.read().await.values(), params))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &ListParams,
    ) -> anyhow::Result<Page<Subscription>> {
        Ok(paginate(
            self.subscriptions
                .read()
                .await
                .values()
                .filter(|s| s.user_id == user_id),
            params,
        ))
    }

    async fn update(&self, subscription: &Subscription) -> anyhow::Result<()> {
        replace(&self.subscriptions, subscription.id, subscription).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.subscriptions.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl BroadcastRepository for InMemory {
    async fn insert(&self, broadcast: &Broadcast) -> anyhow::Result<()> {
        let mut broadcasts = self.broadcasts.write().await;
        if broadcast.is_active && broadcasts.values().any(|b| b.is_active) {
            bail!("another broadcast is already active");
        }
        broadcasts.insert(broadcast.id, broadcast.clone());
        Ok(())
    }

    async fn find_active(&self) -> anyhow::Result<Option<Broadcast>> {
        Ok(self
            .broadcasts
            .read()
            .await
            .values()
            .find(|b| b.is_active)
            .cloned())
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Broadcast>> {
        Ok(paginate(self.broadcasts.read().await.values(), params))
    }

    async fn update(&self, broadcast: &Broadcast) -> anyhow::Result<()> {
        replace(&self.broadcasts, broadcast.id, broadcast).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.broadcasts.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl CodeRepository for InMemory {
    async fn upsert(&self, code: &Code) -> anyhow::Result<()> {
        self.codes.write().await.insert(code.user_id, code.clone());
        Ok(())
    }

    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<Code>> {
        Ok(self.codes.read().await.get(&user_id).cloned())
    }

    async fn delete(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.codes.write().await.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemory {
    async fn insert(&self, transaction: &Transaction) -> anyhow::Result<()> {
        self.transactions.write().await.push(transaction.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CacheRepository for InMemory {
    async fn get(&self, key: &str, now: OffsetDateTime) -> anyhow::Result<Option<CachedResponse>> {
        Ok(self
            .cache
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .cloned())
    }

    async fn put(&self, entry: &CachedResponse) -> anyhow::Result<()> {
        self.cache
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> anyhow::Result<u64> {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(prefix));
        Ok((before - cache.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, ContentType, Recurrence};
    use claims::{assert_err, assert_none, assert_ok, assert_some};
    use secrecy::Secret;
    use time::{macros::datetime, Duration};

    const NOW: OffsetDateTime = datetime!(2026-10-19 12:00 UTC);

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: Secret::new("hash".into()),
            full_name: "Jane Doe".into(),
            address: Address::default(),
            is_admin: false,
            role_id: None,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn subscription(user_id: Uuid) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id,
            content_type: ContentType::Issue,
            recurring: Recurrence::OneTime,
            ids: vec![],
            left: 6,
            access: "LIFE-TIME".into(),
            start_date: NOW,
            end_date: None,
            purchase_date: NOW,
        }
    }

    fn broadcast(active: bool) -> Broadcast {
        Broadcast {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4().to_string(),
            title: None,
            action: "update".into(),
            kind: "live".into(),
            player_url: None,
            collection_type: None,
            is_active: active,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    #[tokio::test]
    async fn emails_are_unique() {
        // given
        let repo = InMemory::default();
        assert_ok!(UserRepository::insert(&repo, &user("jane@example.com")).await);

        // then
        assert_err!(UserRepository::insert(&repo, &user("jane@example.com")).await);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_subscriptions_and_codes() {
        // given
        let repo = InMemory::default();
        let jane = user("jane@example.com");
        let john = user("john@example.com");
        UserRepository::insert(&repo, &jane).await.unwrap();
        UserRepository::insert(&repo, &john).await.unwrap();
        let janes = subscription(jane.id);
        let johns = subscription(john.id);
        SubscriptionRepository::insert(&repo, &janes).await.unwrap();
        SubscriptionRepository::insert(&repo, &johns).await.unwrap();
        repo.upsert(&Code {
            user_id: jane.id,
            code: Secret::new("123456".into()),
            expires_at: NOW,
        })
        .await
        .unwrap();

        // when
        assert!(UserRepository::delete(&repo, jane.id).await.unwrap());

        // then
        assert_none!(SubscriptionRepository::find(&repo, janes.id).await.unwrap());
        assert_some!(SubscriptionRepository::find(&repo, johns.id).await.unwrap());
        assert_none!(CodeRepository::find(&repo, jane.id).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_broadcast_can_be_active() {
        // given
        let repo = InMemory::default();
        BroadcastRepository::insert(&repo, &broadcast(true)).await.unwrap();

        // then
        assert_err!(BroadcastRepository::insert(&repo, &broadcast(true)).await);
        assert_ok!(BroadcastRepository::insert(&repo, &broadcast(false)).await);
    }

    #[tokio::test]
    async fn codes_are_replaced_per_user() {
        // given
        let repo = InMemory::default();
        let user_id = Uuid::new_v4();
        let code = |digits: &str| Code {
            user_id,
            code: Secret::new(digits.into()),
            expires_at: NOW,
        };

        // when
        repo.upsert(&code("111111")).await.unwrap();
        repo.upsert(&code("222222")).await.unwrap();

        // then
        let stored = assert_some!(CodeRepository::find(&repo, user_id).await.unwrap());
        assert_eq!(secrecy::ExposeSecret::expose_secret(&stored.code), "222222");
    }

    #[tokio::test]
    async fn stale_cache_entries_are_not_served_and_prefixes_invalidate() {
        // given
        let repo = InMemory::default();
        let entry = |key: &str, ttl: i64| CachedResponse {
            key: key.into(),
            content_type: None,
            body: b"[]".to_vec(),
            expires_at: NOW + Duration::seconds(ttl),
        };
        repo.put(&entry("/api/v1/issues?page=1", 60)).await.unwrap();
        repo.put(&entry("/api/v1/issues", -1)).await.unwrap();
        repo.put(&entry("/api/v1/videos", 60)).await.unwrap();

        // then
        assert_some!(repo.get("/api/v1/issues?page=1", NOW).await.unwrap());
        assert_none!(repo.get("/api/v1/issues", NOW).await.unwrap());

        // when
        let removed = repo.invalidate_prefix("/api/v1/issues").await.unwrap();

        // then
        assert_eq!(removed, 2);
        assert_some!(repo.get("/api/v1/videos", NOW).await.unwrap());
    }
}
