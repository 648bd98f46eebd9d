//! Object storage for uploaded media and the CDN URIs they are served from.

mod memory;
mod s3;
mod source;

pub use memory::{MemoryObjectStore, StoreCall};
pub use s3::S3ObjectStore;
pub use source::{BytesSource, ChunkSource, FileSource};

use crate::{configuration::PerKind, domain::UploadedFile};
use async_trait::async_trait;
use axum::body::Bytes;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    IssueFile,
    Cover,
    Video,
    Thumbnail,
}

impl ObjectKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::IssueFile => ".pdf",
            Self::Cover => ".jpeg",
            Self::Video => ".mp4",
            Self::Thumbnail => ".jpeg",
        }
    }

    fn select<'a>(&self, values: &'a PerKind) -> &'a str {
        match self {
            Self::IssueFile => &values.issues,
            Self::Cover => &values.covers,
            Self::Video => &values.videos,
            Self::Thumbnail => &values.thumbnails,
        }
    }
}

/// Content is sent to the store in parts of at least this size. S3 rejects
/// multipart parts below 5 MiB, the last one excepted.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Full object key for a key stem: the stem plus the kind's fixed extension.
pub fn object_key(kind: ObjectKind, stem: &str) -> String {
    format!("{stem}{}", kind.extension())
}

#[derive(Debug, thiserror::Error)]
#[error("Object store `{operation}` failed for `{bucket}/{key}`")]
pub struct StorageError {
    pub operation: &'static str,
    pub bucket: String,
    pub key: String,
    /// Provider request id, for tracing the call on the provider side.
    pub request_id: Option<String>,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> Result<(), StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// Starts a multipart upload and returns its id.
    async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Returns the entity tag the store assigned to the part.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number: i32,
        body: Bytes,
    ) -> Result<String, StorageError>;

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<(), StorageError>;

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<(), StorageError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedPart {
    pub number: i32,
    pub etag: String,
}

/// Reads from `source` until `part` holds at least [`PART_SIZE`] bytes.
/// Returns `true` once the source is exhausted.
async fn fill_part(source: &mut dyn ChunkSource, part: &mut Vec<u8>) -> anyhow::Result<bool> {
    while part.len() < PART_SIZE {
        match source.next_chunk().await? {
            Some(chunk) => part.extend_from_slice(&chunk),
            None => return Ok(true),
        }
    }
    Ok(false)
}

/// Bucket routing and CDN URI composition on top of an [`ObjectStore`].
#[derive(Clone)]
pub struct MediaStore {
    store: Arc<dyn ObjectStore>,
    buckets: PerKind,
    cdn: PerKind,
}

impl MediaStore {
    pub fn new(store: Arc<dyn ObjectStore>, buckets: PerKind, cdn: PerKind) -> Self {
        Self {
            store,
            buckets,
            cdn,
        }
    }

    pub fn bucket(&self, kind: ObjectKind) -> &str {
        kind.select(&self.buckets)
    }

    pub fn distribution_uri(&self, kind: ObjectKind, stem: &str) -> String {
        format!(
            "{}/{}",
            kind.select(&self.cdn).trim_end_matches('/'),
            object_key(kind, stem)
        )
    }

    /// Creates whichever of the buckets backing `kinds` do not exist yet.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_buckets(&self, kinds: &[ObjectKind]) -> Result<(), StorageError> {
        for kind in kinds {
            let bucket = self.bucket(*kind);
            if !self.store.bucket_exists(bucket).await? {
                tracing::info!(bucket, "Creating missing bucket");
                self.store.create_bucket(bucket).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, body), fields(size = body.len()))]
    pub async fn upload(
        &self,
        kind: ObjectKind,
        stem: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.store
            .put_object(self.bucket(kind), &object_key(kind, stem), body, content_type)
            .await?;
        Ok(self.distribution_uri(kind, stem))
    }

    /// Stores an uploaded form file, streaming it from disk when it was spooled.
    pub async fn upload_file(
        &self,
        kind: ObjectKind,
        stem: &str,
        file: &UploadedFile,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let mut source = file.chunks().map_err(|e| {
            read_failure(self.bucket(kind), &object_key(kind, stem), e.into())
        })?;
        self.upload_stream(kind, stem, source.as_mut(), content_type)
            .await
    }

    /// Streams `source` into the object. Content that fits into a single part
    /// is stored with one put, anything larger as a multipart upload that is
    /// aborted if reading or sending any part fails.
    #[tracing::instrument(skip(self, source))]
    pub async fn upload_stream(
        &self,
        kind: ObjectKind,
        stem: &str,
        source: &mut dyn ChunkSource,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let bucket = self.bucket(kind);
        let key = object_key(kind, stem);

        let mut part = Vec::with_capacity(PART_SIZE);
        let exhausted = fill_part(source, &mut part)
            .await
            .map_err(|e| read_failure(bucket, &key, e))?;
        if exhausted {
            self.store
                .put_object(bucket, &key, Bytes::from(part), content_type)
                .await?;
            return Ok(self.distribution_uri(kind, stem));
        }

        let upload_id = self.store.begin_upload(bucket, &key, content_type).await?;
        match self
            .upload_parts(bucket, &key, &upload_id, part, source)
            .await
        {
            Ok(parts) => {
                tracing::debug!(parts = parts.len(), "Completing multipart upload");
                self.store
                    .complete_upload(bucket, &key, &upload_id, parts)
                    .await?;
            }
            Err(e) => {
                if let Err(abort) = self.store.abort_upload(bucket, &key, &upload_id).await {
                    tracing::warn!(
                        error.cause_chain = ?abort,
                        upload_id,
                        "Failed to abort the multipart upload"
                    );
                }
                return Err(e);
            }
        }
        Ok(self.distribution_uri(kind, stem))
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut part: Vec<u8>,
        source: &mut dyn ChunkSource,
    ) -> Result<Vec<UploadedPart>, StorageError> {
        let mut parts = Vec::new();
        let mut number = 1;
        loop {
            let body = Bytes::from(std::mem::replace(&mut part, Vec::with_capacity(PART_SIZE)));
            let etag = self
                .store
                .upload_part(bucket, key, upload_id, number, body)
                .await?;
            parts.push(UploadedPart { number, etag });

            let exhausted = fill_part(source, &mut part)
                .await
                .map_err(|e| read_failure(bucket, key, e))?;
            if part.is_empty() {
                return Ok(parts);
            }
            number += 1;
            if exhausted {
                let body = Bytes::from(std::mem::take(&mut part));
                let etag = self
                    .store
                    .upload_part(bucket, key, upload_id, number, body)
                    .await?;
                parts.push(UploadedPart { number, etag });
                return Ok(parts);
            }
        }
    }

    /// Copies the object to a new stem and returns the new URI. The old object is left in place.
    #[tracing::instrument(skip(self))]
    pub async fn copy(
        &self,
        kind: ObjectKind,
        from_stem: &str,
        to_stem: &str,
    ) -> Result<String, StorageError> {
        self.store
            .copy_object(
                self.bucket(kind),
                &object_key(kind, from_stem),
                &object_key(kind, to_stem),
            )
            .await?;
        Ok(self.distribution_uri(kind, to_stem))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, kind: ObjectKind, stem: &str) -> Result<(), StorageError> {
        self.store
            .delete_object(self.bucket(kind), &object_key(kind, stem))
            .await
    }

    pub async fn exists(&self, kind: ObjectKind, stem: &str) -> Result<bool, StorageError> {
        self.store
            .object_exists(self.bucket(kind), &object_key(kind, stem))
            .await
    }
}

fn read_failure(bucket: &str, key: &str, error: anyhow::Error) -> StorageError {
    StorageError {
        operation: "read",
        bucket: bucket.into(),
        key: key.into(),
        request_id: None,
        source: error.into(),
    }
}
