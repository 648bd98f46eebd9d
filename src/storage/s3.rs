use super::{ObjectStore, StorageError, UploadedPart};
use crate::configuration::StorageSettings;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::SdkError,
    operation::RequestId,
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration,
    },
    Client,
};
use axum::body::Bytes;
use secrecy::ExposeSecret;

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    pub async fn from_settings(settings: &StorageSettings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key.expose_secret(),
                None,
                None,
                "pressroom",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region: settings.region.clone(),
        }
    }
}

fn missing(operation: &'static str, bucket: &str, key: &str, what: &str) -> StorageError {
    StorageError {
        operation,
        bucket: bucket.into(),
        key: key.into(),
        request_id: None,
        source: format!("the response carries no {what}").into(),
    }
}

fn failure<E, R>(
    operation: &'static str,
    bucket: &str,
    key: &str,
    error: SdkError<E, R>,
) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
    SdkError<E, R>: RequestId,
{
    StorageError {
        operation,
        bucket: bucket.into(),
        key: key.into(),
        request_id: error.request_id().map(Into::into),
        source: Box::new(error),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.as_service_error(), Some(se) if se.is_not_found()) => Ok(false),
            Err(e) => Err(failure("head_bucket", bucket, "", e)),
        }
    }

    #[tracing::instrument(name = "Create bucket", skip(self))]
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| failure("create_bucket", bucket, "", e))?;
        Ok(())
    }

    #[tracing::instrument(name = "Put object", skip(self, body), fields(size = body.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| failure("put_object", bucket, key, e))?;
        Ok(())
    }

    #[tracing::instrument(name = "Copy object", skip(self))]
    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> Result<(), StorageError> {
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(format!("{bucket}/{from}"))
            .key(to)
            .send()
            .await
            .map_err(|e| failure("copy_object", bucket, from, e))?;
        Ok(())
    }

    #[tracing::instrument(name = "Delete object", skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| failure("delete_object", bucket, key, e))?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.as_service_error(), Some(se) if se.is_not_found()) => Ok(false),
            Err(e) => Err(failure("head_object", bucket, key, e)),
        }
    }

    #[tracing::instrument(name = "Begin multipart upload", skip(self))]
    async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| failure("create_multipart_upload", bucket, key, e))?;
        output
            .upload_id()
            .map(str::to_owned)
            .ok_or_else(|| missing("create_multipart_upload", bucket, key, "upload id"))
    }

    #[tracing::instrument(name = "Upload part", skip(self, body), fields(size = body.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number: i32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| failure("upload_part", bucket, key, e))?;
        output
            .e_tag()
            .map(str::to_owned)
            .ok_or_else(|| missing("upload_part", bucket, key, "entity tag"))
    }

    #[tracing::instrument(name = "Complete multipart upload", skip(self, parts))]
    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<(), StorageError> {
        let parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| failure("complete_multipart_upload", bucket, key, e))?;
        Ok(())
    }

    #[tracing::instrument(name = "Abort multipart upload", skip(self))]
    async fn abort_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| failure("abort_multipart_upload", bucket, key, e))?;
        Ok(())
    }
}
