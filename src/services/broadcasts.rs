//! Mirror of the provider's live event.
//!
//! Webhook events are applied one at a time. When an event archives the
//! active broadcast, its recording is pulled in the background: the
//! provider's render is awaited, stored as a draft video, and both the
//! provider-side and the local broadcast are deleted.

use super::VideoService;
use crate::{
    broadcast_client::{BroadcastClient, BroadcastClientError, RetryPolicy},
    cache::CollectionCache,
    domain::{title_key, Broadcast, ListParams, Page, Video, WebhookEvent},
    errors::ApiError,
    repository::BroadcastRepository,
};
use anyhow::Context;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug)]
pub enum EventOutcome {
    Ignored,
    Created(Broadcast),
    Updated(Broadcast),
    /// The broadcast was archived; its recording is being imported.
    Archived(Broadcast),
}

#[derive(Clone)]
pub struct BroadcastService {
    broadcasts: Arc<dyn BroadcastRepository>,
    videos: VideoService,
    video_pages: CollectionCache,
    provider: BroadcastClient,
    retry_policy: RetryPolicy,
    shutdown: CancellationToken,
    events: Arc<Mutex<()>>,
}

impl BroadcastService {
    /// `video_pages` are the cached video listings, stale once a recording is imported.
    pub fn new(
        broadcasts: Arc<dyn BroadcastRepository>,
        videos: VideoService,
        video_pages: CollectionCache,
        provider: BroadcastClient,
        retry_policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            broadcasts,
            videos,
            video_pages,
            provider,
            retry_policy,
            shutdown,
            events: Arc::new(Mutex::new(())),
        }
    }

    #[tracing::instrument(
        name = "Handle broadcast event",
        skip(self, event),
        fields(event_id = %event.event_id, action = %event.action, kind = %event.kind)
    )]
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<EventOutcome, ApiError> {
        if event.is_removal() {
            return Ok(EventOutcome::Ignored);
        }

        let _guard = self.events.lock().await;
        let now = OffsetDateTime::now_utc();

        match self.broadcasts.find_active().await? {
            None if event.is_archived() => {
                tracing::warn!("Archived event without an active broadcast");
                Ok(EventOutcome::Ignored)
            }
            None => {
                let broadcast = Broadcast::from_event(&event, now);
                self.broadcasts.insert(&broadcast).await?;
                Ok(EventOutcome::Created(broadcast))
            }
            Some(mut broadcast) => {
                let archived = broadcast.apply(&event, now);
                self.broadcasts.update(&broadcast).await?;
                if archived {
                    self.spawn_archive(broadcast.clone());
                    Ok(EventOutcome::Archived(broadcast))
                } else {
                    Ok(EventOutcome::Updated(broadcast))
                }
            }
        }
    }

    fn spawn_archive(&self, broadcast: Broadcast) {
        let service = self.clone();
        let span = tracing::info_span!("Archive broadcast", event_id = %broadcast.event_id);
        tokio::spawn(
            async move {
                if let Err(e) = service.archive(&broadcast).await {
                    tracing::error!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        "Failed to archive the broadcast recording"
                    );
                }
            }
            .instrument(span),
        );
    }

    /// Imports the recording of an archived broadcast and removes the broadcast.
    pub async fn archive(&self, broadcast: &Broadcast) -> Result<Video, anyhow::Error> {
        let event_id = broadcast.event_id.as_str();

        let download = self
            .provider
            .wait_for_download(event_id, &self.retry_policy, &self.shutdown)
            .await
            .context("The recording never became available")?;
        let url = download
            .url
            .ok_or_else(|| BroadcastClientError::MissingUrl(event_id.to_owned()))?;
        let mut recording = self
            .provider
            .download(&url)
            .await
            .context("Failed to download the recording")?;
        tracing::info!(size = ?recording.content_length(), "Downloading the recording");
        let thumbnail = self.snapshot(event_id).await;

        let date = broadcast.updated_at.date();
        let key = format!(
            "broadcast-{date}-{}",
            title_key(event_id).unwrap_or_else(|| broadcast.id.to_string())
        );
        let title = broadcast
            .title
            .clone()
            .unwrap_or_else(|| format!("Broadcast {date}"));
        let video = self
            .videos
            .import_recording(&title, &key, &mut recording, thumbnail)
            .await
            .context("Failed to store the recording")?;
        self.video_pages.invalidate().await;

        self.provider
            .delete_broadcast(event_id)
            .await
            .context("Failed to delete the provider broadcast")?;
        self.broadcasts
            .delete(broadcast.id)
            .await
            .context("Failed to delete the local broadcast")?;

        tracing::info!(video_id = %video.id, "Broadcast recording imported");
        Ok(video)
    }

    /// Missing snapshots leave the video without a thumbnail.
    async fn snapshot(&self, event_id: &str) -> Option<axum::body::Bytes> {
        let url = match self.provider.get_broadcast(event_id).await {
            Ok(Some(broadcast)) => broadcast.snapshot_url,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error.message = %e, "Failed to look up the provider broadcast");
                None
            }
        };
        let Some(url) = url else {
            tracing::warn!("The broadcast has no snapshot");
            return None;
        };

        match self.provider.fetch(&url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error.message = %e, "Failed to download the snapshot");
                None
            }
        }
    }

    #[tracing::instrument(name = "Get active broadcast", skip(self))]
    pub async fn active(&self) -> Result<Option<Broadcast>, ApiError> {
        Ok(self.broadcasts.find_active().await?)
    }

    #[tracing::instrument(name = "List broadcasts", skip(self))]
    pub async fn list(&self, params: &ListParams) -> Result<Page<Broadcast>, ApiError> {
        Ok(self.broadcasts.list(params).await?)
    }
}
