use super::{
    BroadcastRepository, CacheRepository, CatalogRepository, CodeRepository, IssueRepository,
    SubscriptionRepository, TransactionRepository, UserRepository, VideoRepository,
};
use crate::domain::{
    Address, Broadcast, CachedResponse, Category, Code, Issue, ListParams, Page, Permission,
    Role, Subscription, Transaction, User, Video,
};
use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use sqlx::{postgres::PgRow, PgPool, QueryBuilder, Row};
use time::OffsetDateTime;
use uuid::Uuid;

/// Postgres backend. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_page<T>(
        &self,
        table: &str,
        scope: Option<(&str, Uuid)>,
        params: &ListParams,
        map: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> anyhow::Result<Page<T>> {
        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
        push_conditions(&mut count, scope, params);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {table}"))?;

        let mut select = QueryBuilder::new(format!("SELECT * FROM {table}"));
        push_conditions(&mut select, scope, params);
        select
            .push(format_args!(
                " ORDER BY {} {} NULLS LAST, id",
                params.sort.column,
                if params.sort.descending { "DESC" } else { "ASC" }
            ))
            .push(" LIMIT ")
            .push_bind(i64::from(params.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(params.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {table}"))?;
        let data = rows
            .iter()
            .map(map)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to decode {table}"))?;

        Ok(Page {
            data,
            page: params.page,
            limit: params.limit,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

/// Filter columns come from a per-resource allow-list; values are always bound.
fn push_conditions(
    builder: &mut QueryBuilder<'_, sqlx::Postgres>,
    scope: Option<(&str, Uuid)>,
    params: &ListParams,
) {
    let mut keyword = " WHERE ";
    if let Some((column, id)) = scope {
        builder.push(keyword).push(column).push(" = ").push_bind(id);
        keyword = " AND ";
    }
    for filter in &params.filters {
        builder
            .push(keyword)
            .push(filter.column)
            .push("::TEXT ILIKE ")
            .push_bind(format!("%{}%", escape_like(&filter.needle)))
            .push(" ESCAPE '\\'");
        keyword = " AND ";
    }
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: TryFrom<String, Error = String>,
{
    let raw: String = row.try_get(column)?;
    T::try_from(raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: Secret::new(row.try_get("password_hash")?),
        full_name: row.try_get("full_name")?,
        address: Address {
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            phone: row.try_get("phone")?,
        },
        is_admin: row.try_get("is_admin")?,
        role_id: row.try_get("role_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn category_from_row(row: &PgRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        permissions: row.try_get("permissions")?,
        created_at: row.try_get("created_at")?,
    })
}

fn issue_from_row(row: &PgRow) -> Result<Issue, sqlx::Error> {
    Ok(Issue {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        key: row.try_get("key")?,
        description: row.try_get("description")?,
        order: row.try_get("display_order")?,
        file: row.try_get("file")?,
        cover: row.try_get("cover")?,
        paid: row.try_get("paid")?,
        views: row.try_get("views")?,
        category_id: row.try_get("category_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn video_from_row(row: &PgRow) -> Result<Video, sqlx::Error> {
    Ok(Video {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        key: row.try_get("key")?,
        description: row.try_get("description")?,
        uri: row.try_get("uri")?,
        thumbnail: row.try_get("thumbnail")?,
        duration: row.try_get("duration")?,
        for_sale: row.try_get("for_sale")?,
        paid: row.try_get("paid")?,
        status: decode(row, "status")?,
        views: row.try_get("views")?,
        category_id: row.try_get("category_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, sqlx::Error> {
    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        content_type: decode(row, "content_type")?,
        recurring: decode(row, "recurring")?,
        ids: row.try_get("ids")?,
        left: row.try_get("slots_left")?,
        access: row.try_get("access")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        purchase_date: row.try_get("purchase_date")?,
    })
}

fn broadcast_from_row(row: &PgRow) -> Result<Broadcast, sqlx::Error> {
    Ok(Broadcast {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        title: row.try_get("title")?,
        action: row.try_get("action")?,
        kind: row.try_get("kind")?,
        player_url: row.try_get("player_url")?,
        collection_type: row.try_get("collection_type")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: row.try_get("kind")?,
        recipient: row.try_get("recipient")?,
        status: decode(row, "status")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for Postgres {
    #[tracing::instrument(name = "Insert user", skip_all)]
    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, full_name, address, city, postal_code,
                country, phone, is_admin, role_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.password_hash.expose_secret())
        .bind(&user.full_name)
        .bind(&user.address.address)
        .bind(&user.address.city)
        .bind(&user.address.postal_code)
        .bind(&user.address.country)
        .bind(&user.address.phone)
        .bind(user.is_admin)
        .bind(user.role_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<User>> {
        self.fetch_page("users", None, params, user_from_row).await
    }

    #[tracing::instrument(name = "Update user", skip_all)]
    async fn update(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                email = $2, password_hash = $3, full_name = $4, address = $5, city = $6,
                postal_code = $7, country = $8, phone = $9, is_admin = $10, role_id = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.password_hash.expose_secret())
        .bind(&user.full_name)
        .bind(&user.address.address)
        .bind(&user.address.city)
        .bind(&user.address.postal_code)
        .bind(&user.address.country)
        .bind(&user.address.phone)
        .bind(user.is_admin)
        .bind(user.role_id)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;
        Ok(())
    }

    #[tracing::instrument(name = "Delete user", skip(self))]
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .context("Failed to acquire a Postgres connection from the pool")?;

        sqlx::query("DELETE FROM subscriptions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete user subscriptions")?;
        sqlx::query("DELETE FROM codes WHERE user_id = $1")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete user codes")?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete user")?
            .rows_affected();

        transaction
            .commit()
            .await
            .context("Failed to commit user deletion")?;
        Ok(deleted > 0)
    }
}

macro_rules! named_repository {
    ($entity:ty, $table:literal, $from_row:ident) => {
        #[async_trait]
        impl CatalogRepository<$entity> for Postgres {
            async fn insert(&self, item: &$entity) -> anyhow::Result<()> {
                sqlx::query(concat!(
                    "INSERT INTO ",
                    $table,
                    " (id, name, description, created_at) VALUES ($1, $2, $3, $4)"
                ))
                .bind(item.id)
                .bind(&item.name)
                .bind(&item.description)
                .bind(item.created_at)
                .execute(&self.pool)
                .await
                .context(concat!("Failed to insert into ", $table))?;
                Ok(())
            }

            async fn find(&self, id: Uuid) -> anyhow::Result<Option<$entity>> {
                let row = sqlx::query(concat!("SELECT * FROM ", $table, " WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .context(concat!("Failed to fetch from ", $table))?;
                Ok(row.as_ref().map($from_row).transpose()?)
            }

            async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<$entity>> {
                let row = sqlx::query(concat!("SELECT * FROM ", $table, " WHERE name = $1"))
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                    .context(concat!("Failed to fetch from ", $table))?;
                Ok(row.as_ref().map($from_row).transpose()?)
            }

            async fn list(&self, params: &ListParams) -> anyhow::Result<Page<$entity>> {
                self.fetch_page($table, None, params, $from_row).await
            }

            async fn update(&self, item: &$entity) -> anyhow::Result<()> {
                sqlx::query(concat!(
                    "UPDATE ",
                    $table,
                    " SET name = $2, description = $3 WHERE id = $1"
                ))
                .bind(item.id)
                .bind(&item.name)
                .bind(&item.description)
                .execute(&self.pool)
                .await
                .context(concat!("Failed to update ", $table))?;
                Ok(())
            }

            async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
                let result = sqlx::query(concat!("DELETE FROM ", $table, " WHERE id = $1"))
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .context(concat!("Failed to delete from ", $table))?;
                Ok(result.rows_affected() > 0)
            }
        }
    };
}

named_repository!(Category, "categories", category_from_row);
named_repository!(Permission, "permissions", permission_from_row);

#[async_trait]
impl CatalogRepository<Role> for Postgres {
    async fn insert(&self, role: &Role) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO roles (id, name, description, permissions, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.permissions)
        .bind(role.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert role")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Role>> {
        let row = sqlx::query("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch role")?;
        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Role>> {
        let row = sqlx::query("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch role by name")?;
        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Role>> {
        self.fetch_page("roles", None, params, role_from_row).await
    }

    async fn update(&self, role: &Role) -> anyhow::Result<()> {
        sqlx::query("UPDATE roles SET name = $2, description = $3, permissions = $4 WHERE id = $1")
            .bind(role.id)
            .bind(&role.name)
            .bind(&role.description)
            .bind(&role.permissions)
            .execute(&self.pool)
            .await
            .context("Failed to update role")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete role")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IssueRepository for Postgres {
    #[tracing::instrument(name = "Insert issue", skip_all, fields(title = %issue.title))]
    async fn insert(&self, issue: &Issue) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (
                id, title, key, description, display_order, file, cover, paid, views,
                category_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(issue.id)
        .bind(&issue.title)
        .bind(&issue.key)
        .bind(&issue.description)
        .bind(issue.order)
        .bind(&issue.file)
        .bind(&issue.cover)
        .bind(issue.paid)
        .bind(issue.views)
        .bind(issue.category_id)
        .bind(issue.created_at)
        .bind(issue.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert issue")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Issue>> {
        let row = sqlx::query("SELECT * FROM issues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch issue")?;
        Ok(row.as_ref().map(issue_from_row).transpose()?)
    }

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Issue>> {
        let row = sqlx::query("SELECT * FROM issues WHERE title = $1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch issue by title")?;
        Ok(row.as_ref().map(issue_from_row).transpose()?)
    }

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Issue>> {
        let row = sqlx::query("SELECT * FROM issues WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch issue by key")?;
        Ok(row.as_ref().map(issue_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Issue>> {
        self.fetch_page("issues", None, params, issue_from_row).await
    }

    async fn update(&self, issue: &Issue) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE issues SET
                title = $2, key = $3, description = $4, file = $5, cover = $6, paid = $7,
                category_id = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(issue.id)
        .bind(&issue.title)
        .bind(&issue.key)
        .bind(&issue.description)
        .bind(&issue.file)
        .bind(&issue.cover)
        .bind(issue.paid)
        .bind(issue.category_id)
        .bind(issue.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update issue")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM issues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete issue")?;
        Ok(result.rows_affected() > 0)
    }

    async fn next_order(&self) -> anyhow::Result<i32> {
        sqlx::query_scalar("SELECT COALESCE(MAX(display_order), 0) + 1 FROM issues")
            .fetch_one(&self.pool)
            .await
            .context("Failed to compute the next issue order")
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE issues SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to count an issue view")?;
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for Postgres {
    #[tracing::instrument(name = "Insert video", skip_all, fields(title = %video.title))]
    async fn insert(&self, video: &Video) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (
                id, title, key, description, uri, thumbnail, duration, for_sale, paid,
                status, views, category_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.key)
        .bind(&video.description)
        .bind(&video.uri)
        .bind(&video.thumbnail)
        .bind(video.duration)
        .bind(video.for_sale)
        .bind(video.paid)
        .bind(video.status.as_ref())
        .bind(video.views)
        .bind(video.category_id)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert video")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Video>> {
        let row = sqlx::query("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch video")?;
        Ok(row.as_ref().map(video_from_row).transpose()?)
    }

    async fn find_by_title(&self, title: &str) -> anyhow::Result<Option<Video>> {
        let row = sqlx::query("SELECT * FROM videos WHERE title = $1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch video by title")?;
        Ok(row.as_ref().map(video_from_row).transpose()?)
    }

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Video>> {
        let row = sqlx::query("SELECT * FROM videos WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch video by key")?;
        Ok(row.as_ref().map(video_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Video>> {
        self.fetch_page("videos", None, params, video_from_row).await
    }

    async fn update(&self, video: &Video) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE videos SET
                title = $2, key = $3, description = $4, uri = $5, thumbnail = $6,
                duration = $7, for_sale = $8, paid = $9, status = $10, category_id = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.key)
        .bind(&video.description)
        .bind(&video.uri)
        .bind(&video.thumbnail)
        .bind(video.duration)
        .bind(video.for_sale)
        .bind(video.paid)
        .bind(video.status.as_ref())
        .bind(video.category_id)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update video")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete video")?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE videos SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to count a video view")?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for Postgres {
    #[tracing::instrument(name = "Insert subscription", skip_all)]
    async fn insert(&self, subscription: &Subscription) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, content_type, recurring, ids, slots_left, access,
                start_date, end_date, purchase_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.content_type.as_ref())
        .bind(subscription.recurring.as_ref())
        .bind(&subscription.ids)
        .bind(subscription.left)
        .bind(&subscription.access)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.purchase_date)
        .execute(&self.pool)
        .await
        .context("Failed to insert subscription")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch subscription")?;
        Ok(row.as_ref().map(subscription_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Subscription>> {
        self.fetch_page("subscriptions", None, params, subscription_from_row)
            .await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &ListParams,
    ) -> anyhow::Result<Page<Subscription>> {
        self.fetch_page(
            "subscriptions",
            Some(("user_id", user_id)),
            params,
            subscription_from_row,
        )
        .await
    }

    async fn update(&self, subscription: &Subscription) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET ids = $2, slots_left = $3 WHERE id = $1")
            .bind(subscription.id)
            .bind(&subscription.ids)
            .bind(subscription.left)
            .execute(&self.pool)
            .await
            .context("Failed to update subscription")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete subscription")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BroadcastRepository for Postgres {
    async fn insert(&self, broadcast: &Broadcast) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO broadcasts (
                id, event_id, title, action, kind, player_url, collection_type,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(broadcast.id)
        .bind(&broadcast.event_id)
        .bind(&broadcast.title)
        .bind(&broadcast.action)
        .bind(&broadcast.kind)
        .bind(&broadcast.player_url)
        .bind(&broadcast.collection_type)
        .bind(broadcast.is_active)
        .bind(broadcast.created_at)
        .bind(broadcast.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert broadcast")?;
        Ok(())
    }

    async fn find_active(&self) -> anyhow::Result<Option<Broadcast>> {
        let row = sqlx::query("SELECT * FROM broadcasts WHERE is_active")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch the active broadcast")?;
        Ok(row.as_ref().map(broadcast_from_row).transpose()?)
    }

    async fn list(&self, params: &ListParams) -> anyhow::Result<Page<Broadcast>> {
        self.fetch_page("broadcasts", None, params, broadcast_from_row)
            .await
    }

    async fn update(&self, broadcast: &Broadcast) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE broadcasts SET
                title = $2, action = $3, kind = $4, player_url = $5, collection_type = $6,
                is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(broadcast.id)
        .bind(&broadcast.title)
        .bind(&broadcast.action)
        .bind(&broadcast.kind)
        .bind(&broadcast.player_url)
        .bind(&broadcast.collection_type)
        .bind(broadcast.is_active)
        .bind(broadcast.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update broadcast")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM broadcasts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete broadcast")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CodeRepository for Postgres {
    #[tracing::instrument(name = "Store reset code", skip_all, fields(user_id = %code.user_id))]
    async fn upsert(&self, code: &Code) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO codes (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(code.user_id)
        .bind(code.code.expose_secret())
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to store reset code")?;
        Ok(())
    }

    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<Code>> {
        let row = sqlx::query("SELECT user_id, code, expires_at FROM codes WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch reset code")?;

        row.map(|r| -> anyhow::Result<Code> {
            Ok(Code {
                user_id: r.try_get("user_id")?,
                code: Secret::new(r.try_get("code")?),
                expires_at: r.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn delete(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete reset code")?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for Postgres {
    async fn insert(&self, transaction: &Transaction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, kind, recipient, status, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(&transaction.kind)
        .bind(&transaction.recipient)
        .bind(transaction.status.as_ref())
        .bind(&transaction.error)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to record transaction")?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Transaction>> {
        let rows =
            sqlx::query("SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list transactions")?;
        Ok(rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl CacheRepository for Postgres {
    async fn get(&self, key: &str, now: OffsetDateTime) -> anyhow::Result<Option<CachedResponse>> {
        let row = sqlx::query(
            "SELECT key, content_type, body, expires_at FROM response_cache WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read the response cache")?;

        row.map(|r| -> anyhow::Result<CachedResponse> {
            Ok(CachedResponse {
                key: r.try_get("key")?,
                content_type: r.try_get("content_type")?,
                body: r.try_get("body")?,
                expires_at: r.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn put(&self, entry: &CachedResponse) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO response_cache (key, content_type, body, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET content_type = EXCLUDED.content_type, body = EXCLUDED.body,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.content_type)
        .bind(&entry.body)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to write the response cache")?;
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM response_cache WHERE left(key, length($1)) = $1")
            .bind(prefix)
            .execute(&self.pool)
            .await
            .context("Failed to invalidate the response cache")?;
        Ok(result.rows_affected())
    }
}
