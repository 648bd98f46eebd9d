use super::required_title;
use crate::{
    domain::{title_key, Issue, IssueUpdate, ListParams, MediaKind, Page, UploadForm},
    errors::ApiError,
    repository::IssueRepository,
    storage::{MediaStore, ObjectKind},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct IssueService {
    issues: Arc<dyn IssueRepository>,
    media: MediaStore,
}

impl IssueService {
    pub fn new(issues: Arc<dyn IssueRepository>, media: MediaStore) -> Self {
        Self { issues, media }
    }

    /// Stores the PDF and its cover, then records the issue at the end of the
    /// display order.
    #[tracing::instrument(name = "Create issue", skip_all, fields(title = tracing::field::Empty))]
    pub async fn create(&self, form: UploadForm) -> Result<Issue, ApiError> {
        MediaKind::Issue.validate(&form)?;
        let title = required_title(form.text("title"))?;
        tracing::Span::current().record("title", title.as_str());

        let key = title_key(&title).ok_or_else(|| {
            ApiError::validation(&title, "Title must contain letters or digits.")
        })?;
        if self.issues.find_by_title(&title).await?.is_some() {
            return Err(ApiError::rule(&title, "An issue with this title already exists."));
        }
        self.media
            .ensure_buckets(&[ObjectKind::IssueFile, ObjectKind::Cover])
            .await?;
        self.ensure_key_is_free(&title, &key).await?;

        let (document, cover) = match (form.files.get("issue"), form.files.get("cover")) {
            (Some(document), Some(cover)) => (document, cover),
            _ => return Err(ApiError::validation("issue", "Issue file is required.")),
        };
        let file = self
            .media
            .upload_file(ObjectKind::IssueFile, &key, document, "application/pdf")
            .await?;
        let cover = self
            .media
            .upload_file(ObjectKind::Cover, &key, cover, &cover.content_type)
            .await?;

        let now = OffsetDateTime::now_utc();
        let issue = Issue {
            id: Uuid::new_v4(),
            title,
            key,
            description: form.text("description").map(str::to_string),
            order: self.issues.next_order().await?,
            file,
            cover,
            paid: form.flag("paid")?.unwrap_or(false),
            views: 0,
            category_id: form.uuid("categoryId")?,
            created_at: now,
            updated_at: now,
        };
        self.issues.insert(&issue).await?;

        Ok(issue)
    }

    /// Applies the update; a new title moves both stored objects to the new key.
    #[tracing::instrument(name = "Update issue", skip(self, update))]
    pub async fn update(&self, id: Uuid, update: IssueUpdate) -> Result<Issue, ApiError> {
        let mut issue = self.find(id).await?;
        let mut moved_from = None;

        if update.title.is_some() {
            let title = required_title(update.title.as_deref())?;
            if title != issue.title {
                if self.issues.find_by_title(&title).await?.is_some() {
                    return Err(ApiError::rule(&title, "An issue with this title already exists."));
                }
                let key = title_key(&title).ok_or_else(|| {
                    ApiError::validation(&title, "Title must contain letters or digits.")
                })?;
                if key != issue.key {
                    self.ensure_key_is_free(&title, &key).await?;
                    issue.file = self.media.copy(ObjectKind::IssueFile, &issue.key, &key).await?;
                    issue.cover = self.media.copy(ObjectKind::Cover, &issue.key, &key).await?;
                    moved_from = Some(std::mem::replace(&mut issue.key, key));
                }
                issue.title = title;
            }
        }
        if update.description.is_some() {
            issue.description = update.description;
        }
        if let Some(paid) = update.paid {
            issue.paid = paid;
        }
        if update.category_id.is_some() {
            issue.category_id = update.category_id;
        }
        issue.updated_at = OffsetDateTime::now_utc();
        self.issues.update(&issue).await?;

        if let Some(old_key) = moved_from {
            self.remove_objects(&old_key).await;
        }

        Ok(issue)
    }

    /// Counts a view.
    #[tracing::instrument(name = "Get issue", skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Issue, ApiError> {
        let mut issue = self.find(id).await?;
        self.issues.increment_views(id).await?;
        issue.views += 1;
        Ok(issue)
    }

    #[tracing::instrument(name = "List issues", skip(self))]
    pub async fn list(&self, params: &ListParams) -> Result<Page<Issue>, ApiError> {
        Ok(self.issues.list(params).await?)
    }

    #[tracing::instrument(name = "Delete issue", skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let issue = self.find(id).await?;
        self.issues.delete(id).await?;
        self.remove_objects(&issue.key).await;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Issue, ApiError> {
        self.issues
            .find(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Issue"))
    }

    /// Titles that differ only in case or punctuation share a key, and so
    /// would share the stored objects.
    async fn ensure_key_is_free(&self, title: &str, key: &str) -> Result<(), ApiError> {
        if self.issues.find_by_key(key).await?.is_some()
            || self.media.exists(ObjectKind::IssueFile, key).await?
        {
            return Err(ApiError::rule(
                title,
                "The title collides with the stored file of another issue.",
            ));
        }
        Ok(())
    }

    /// Leftover objects are orphaned, not fatal: the record no longer points at them.
    async fn remove_objects(&self, key: &str) {
        for kind in [ObjectKind::IssueFile, ObjectKind::Cover] {
            if let Err(e) = self.media.remove(kind, key).await {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    key,
                    "Failed to remove a stored issue object"
                );
            }
        }
    }
}
