use super::required_title;
use crate::{
    domain::{
        title_key, ListParams, MediaKind, Page, UploadForm, Video, VideoStatus, VideoUpdate,
    },
    errors::ApiError,
    repository::VideoRepository,
    storage::{ChunkSource, MediaStore, ObjectKind},
};
use axum::body::Bytes;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct VideoService {
    videos: Arc<dyn VideoRepository>,
    media: MediaStore,
}

impl VideoService {
    pub fn new(videos: Arc<dyn VideoRepository>, media: MediaStore) -> Self {
        Self { videos, media }
    }

    #[tracing::instrument(name = "Create video", skip_all, fields(title = tracing::field::Empty))]
    pub async fn create(&self, form: UploadForm) -> Result<Video, ApiError> {
        MediaKind::Video.validate(&form)?;
        let title = required_title(form.text("title"))?;
        tracing::Span::current().record("title", title.as_str());

        let key = title_key(&title).ok_or_else(|| {
            ApiError::validation(&title, "Title must contain letters or digits.")
        })?;
        if self.videos.find_by_title(&title).await?.is_some() {
            return Err(ApiError::rule(&title, "A video with this title already exists."));
        }
        self.media
            .ensure_buckets(&[ObjectKind::Video, ObjectKind::Thumbnail])
            .await?;
        self.ensure_key_is_free(&title, &key).await?;

        let (content, thumbnail) = match (form.files.get("video"), form.files.get("thumbnail")) {
            (Some(content), Some(thumbnail)) => (content, thumbnail),
            _ => return Err(ApiError::validation("video", "Video file is required.")),
        };
        let uri = self
            .media
            .upload_file(ObjectKind::Video, &key, content, &content.content_type)
            .await?;
        let thumbnail = self
            .media
            .upload_file(ObjectKind::Thumbnail, &key, thumbnail, &thumbnail.content_type)
            .await?;

        let now = OffsetDateTime::now_utc();
        let status = match form.text("status") {
            None => VideoStatus::Published,
            Some(raw) => VideoStatus::try_from(raw.to_uppercase())
                .map_err(|msg| ApiError::validation(raw, msg))?,
        };
        let video = Video {
            id: Uuid::new_v4(),
            title,
            key,
            description: form.text("description").map(str::to_string),
            uri,
            thumbnail: Some(thumbnail),
            duration: form.number("duration")?.unwrap_or(0),
            for_sale: form.flag("forSale")?.unwrap_or(false),
            paid: form.flag("paid")?.unwrap_or(false),
            status,
            views: 0,
            category_id: form.uuid("categoryId")?,
            created_at: now,
            updated_at: now,
        };
        self.videos.insert(&video).await?;

        Ok(video)
    }

    /// Stores a finished broadcast recording as an unpublished video.
    #[tracing::instrument(name = "Import recording", skip(self, recording, thumbnail))]
    pub async fn import_recording(
        &self,
        title: &str,
        key: &str,
        recording: &mut dyn ChunkSource,
        thumbnail: Option<Bytes>,
    ) -> Result<Video, ApiError> {
        self.media
            .ensure_buckets(&[ObjectKind::Video, ObjectKind::Thumbnail])
            .await?;
        let uri = self
            .media
            .upload_stream(ObjectKind::Video, key, recording, "video/mp4")
            .await?;
        let thumbnail = match thumbnail {
            Some(bytes) => Some(
                self.media
                    .upload(ObjectKind::Thumbnail, key, bytes, "image/jpeg")
                    .await?,
            ),
            None => None,
        };

        let title = match self.videos.find_by_title(title).await? {
            Some(_) => format!("{title} ({key})"),
            None => title.to_string(),
        };
        let now = OffsetDateTime::now_utc();
        let video = Video {
            id: Uuid::new_v4(),
            title,
            key: key.to_string(),
            description: None,
            uri,
            thumbnail,
            duration: 0,
            for_sale: false,
            paid: false,
            status: VideoStatus::Draft,
            views: 0,
            category_id: None,
            created_at: now,
            updated_at: now,
        };
        self.videos.insert(&video).await?;

        Ok(video)
    }

    #[tracing::instrument(name = "Update video", skip(self, update))]
    pub async fn update(&self, id: Uuid, update: VideoUpdate) -> Result<Video, ApiError> {
        let mut video = self.find(id).await?;
        let mut moved_from = None;

        if update.title.is_some() {
            let title = required_title(update.title.as_deref())?;
            if title != video.title {
                if self.videos.find_by_title(&title).await?.is_some() {
                    return Err(ApiError::rule(&title, "A video with this title already exists."));
                }
                let key = title_key(&title).ok_or_else(|| {
                    ApiError::validation(&title, "Title must contain letters or digits.")
                })?;
                if key != video.key {
                    self.ensure_key_is_free(&title, &key).await?;
                    video.uri = self.media.copy(ObjectKind::Video, &video.key, &key).await?;
                    if video.thumbnail.is_some() {
                        video.thumbnail = Some(
                            self.media
                                .copy(ObjectKind::Thumbnail, &video.key, &key)
                                .await?,
                        );
                    }
                    moved_from = Some(std::mem::replace(&mut video.key, key));
                }
                video.title = title;
            }
        }
        if update.description.is_some() {
            video.description = update.description;
        }
        if let Some(paid) = update.paid {
            video.paid = paid;
        }
        if let Some(for_sale) = update.for_sale {
            video.for_sale = for_sale;
        }
        if let Some(duration) = update.duration {
            if duration < 0 {
                return Err(ApiError::validation(
                    duration.to_string(),
                    "`duration` must be a positive number.",
                ));
            }
            video.duration = duration;
        }
        if let Some(status) = update.status {
            video.status = status;
        }
        if update.category_id.is_some() {
            video.category_id = update.category_id;
        }
        video.updated_at = OffsetDateTime::now_utc();
        self.videos.update(&video).await?;

        if let Some(old_key) = moved_from {
            self.remove_objects(&old_key, video.thumbnail.is_some()).await;
        }

        Ok(video)
    }

    /// Counts a view.
    #[tracing::instrument(name = "Get video", skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Video, ApiError> {
        let mut video = self.find(id).await?;
        self.videos.increment_views(id).await?;
        video.views += 1;
        Ok(video)
    }

    /// Lists only the videos in `status`, whatever the client filtered on.
    #[tracing::instrument(name = "List videos", skip(self, params))]
    pub async fn list(
        &self,
        params: ListParams,
        status: VideoStatus,
    ) -> Result<Page<Video>, ApiError> {
        let params = params.restrict("status", status.as_ref());
        Ok(self.videos.list(&params).await?)
    }

    #[tracing::instrument(name = "Delete video", skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let video = self.find(id).await?;
        self.videos.delete(id).await?;
        self.remove_objects(&video.key, video.thumbnail.is_some())
            .await;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Video, ApiError> {
        self.videos
            .find(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Video"))
    }

    async fn ensure_key_is_free(&self, title: &str, key: &str) -> Result<(), ApiError> {
        if self.videos.find_by_key(key).await?.is_some()
            || self.media.exists(ObjectKind::Video, key).await?
        {
            return Err(ApiError::rule(
                title,
                "The title collides with the stored file of another video.",
            ));
        }
        Ok(())
    }

    async fn remove_objects(&self, key: &str, with_thumbnail: bool) {
        let kinds: &[ObjectKind] = if with_thumbnail {
            &[ObjectKind::Video, ObjectKind::Thumbnail]
        } else {
            &[ObjectKind::Video]
        };
        for kind in kinds {
            if let Err(e) = self.media.remove(*kind, key).await {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    key,
                    "Failed to remove a stored video object"
                );
            }
        }
    }
}
