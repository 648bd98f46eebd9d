//! Client for the live broadcast provider.
//!
//! The provider hosts the live events mirrored by [`crate::domain::Broadcast`].
//! Once an event is archived its recording is exposed through a download
//! handle that has to be polled until the render is complete.

use crate::storage::ChunkSource;
use anyhow::Context;
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, thiserror::Error)]
pub enum BroadcastClientError {
    #[error("Broadcast provider request failed")]
    Http(#[from] reqwest::Error),
    #[error("Broadcast provider answered {status} (request id: {request_id:?})")]
    Provider {
        status: StatusCode,
        request_id: Option<String>,
    },
    #[error("Download of broadcast `{0}` was not ready after {1} attempts")]
    NotReady(String, u32),
    #[error("Download of broadcast `{0}` has no url")]
    MissingUrl(String),
    #[error("Waiting for broadcast `{0}` was cancelled")]
    Cancelled(String),
}

impl BroadcastClientError {
    /// Failures worth another attempt: transport errors, throttling and
    /// provider-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Provider { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Fixed-interval polling bounded by a number of attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBroadcast {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snapshot_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DownloadHandle {
    pub status: String,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub url: Option<String>,
}

impl DownloadHandle {
    pub fn is_ready(&self) -> bool {
        self.status.eq_ignore_ascii_case("success") && self.progress >= 100
    }
}

/// A rendered artifact streamed from the provider. Each chunk has to arrive
/// within the client timeout; the download as a whole is unbounded.
pub struct Download {
    response: Response,
    stall_timeout: Duration,
}

impl Download {
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }
}

#[async_trait]
impl ChunkSource for Download {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        let chunk = tokio::time::timeout(self.stall_timeout, self.response.chunk())
            .await
            .context("The download stalled")??;
        Ok(chunk)
    }
}

#[derive(Clone)]
pub struct BroadcastClient {
    http_client: Client,
    download_client: Client,
    base_url: String,
    api_key: Secret<String>,
    timeout: Duration,
}

impl BroadcastClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let download_client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            http_client,
            download_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `None` when the provider no longer knows the broadcast.
    #[tracing::instrument(name = "Get provider broadcast", skip(self))]
    pub async fn get_broadcast(
        &self,
        id: &str,
    ) -> Result<Option<ProviderBroadcast>, BroadcastClientError> {
        let response = self
            .http_client
            .get(self.url(&format!("/broadcasts/{id}")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(checked(response)?.json().await?))
    }

    /// Deleting a broadcast the provider does not know is not an error.
    #[tracing::instrument(name = "Delete provider broadcast", skip(self))]
    pub async fn delete_broadcast(&self, id: &str) -> Result<(), BroadcastClientError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/broadcasts/{id}")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            checked(response)?;
        }
        Ok(())
    }

    #[tracing::instrument(name = "Request broadcast download", skip(self))]
    pub async fn request_download(&self, id: &str) -> Result<DownloadHandle, BroadcastClientError> {
        let response = self
            .http_client
            .post(self.url(&format!("/broadcasts/{id}/downloads")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        Ok(checked(response)?.json().await?)
    }

    /// Fetches a small artifact, such as a snapshot, into memory. Artifact urls
    /// are pre-signed by the provider.
    #[tracing::instrument(name = "Fetch broadcast artifact", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Bytes, BroadcastClientError> {
        let response = self.http_client.get(url).send().await?;
        Ok(checked(response)?.bytes().await?)
    }

    /// Opens a recording for streaming.
    #[tracing::instrument(name = "Download broadcast recording", skip(self))]
    pub async fn download(&self, url: &str) -> Result<Download, BroadcastClientError> {
        let response = self.download_client.get(url).send().await?;
        Ok(Download {
            response: checked(response)?,
            stall_timeout: self.timeout,
        })
    }

    /// Polls the download handle until the render is complete.
    #[tracing::instrument(name = "Wait for broadcast download", skip(self, cancel))]
    pub async fn wait_for_download(
        &self,
        id: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<DownloadHandle, BroadcastClientError> {
        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(BroadcastClientError::Cancelled(id.to_owned()));
            }

            match self.request_download(id).await {
                Ok(handle) if handle.is_ready() => {
                    return match handle.url {
                        Some(_) => Ok(handle),
                        None => Err(BroadcastClientError::MissingUrl(id.to_owned())),
                    };
                }
                Ok(handle) => tracing::debug!(
                    attempt,
                    status = %handle.status,
                    progress = handle.progress,
                    "Broadcast download not ready yet"
                ),
                Err(e) if e.is_transient() => tracing::warn!(
                    attempt,
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to poll the broadcast download, retrying"
                ),
                Err(e) => return Err(e),
            }

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(BroadcastClientError::Cancelled(id.to_owned()));
                    }
                    _ = tokio::time::sleep(policy.interval) => {}
                }
            }
        }

        Err(BroadcastClientError::NotReady(
            id.to_owned(),
            policy.max_attempts,
        ))
    }
}

fn checked(response: Response) -> Result<Response, BroadcastClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    tracing::warn!(%status, request_id = ?request_id, "Broadcast provider rejected the request");

    Err(BroadcastClientError::Provider { status, request_id })
}
