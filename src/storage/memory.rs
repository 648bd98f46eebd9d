use super::{ObjectStore, StorageError, UploadedPart};
use async_trait::async_trait;
use axum::body::Bytes;
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

/// Operation recorded by [`MemoryObjectStore`], in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    CreateBucket { bucket: String },
    Put { bucket: String, key: String },
    Copy { bucket: String, from: String, to: String },
    Delete { bucket: String, key: String },
    UploadPart { bucket: String, key: String, number: i32 },
    CompleteUpload { bucket: String, key: String },
    AbortUpload { bucket: String, key: String },
}

struct PendingUpload {
    bucket: String,
    key: String,
    parts: HashMap<i32, Bytes>,
}

/// In-process object store for local runs and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, HashMap<String, Bytes>>>,
    calls: Mutex<Vec<StoreCall>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryObjectStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        lock(&self.buckets)
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        lock(&self.buckets).get(bucket).map_or(0, HashMap::len)
    }

    /// Multipart uploads that were started but neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        lock(&self.uploads).len()
    }

    /// Makes every subsequent call of `operation` (`put`, `copy`, `delete`, `part`) fail.
    pub fn fail(&self, operation: &'static str) {
        lock(&self.failing).insert(operation);
    }

    fn check(&self, operation: &'static str, bucket: &str, key: &str) -> Result<(), StorageError> {
        if lock(&self.failing).contains(operation) {
            return Err(error(operation, bucket, key, "injected failure"));
        }
        Ok(())
    }

    fn record(&self, call: StoreCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn error(operation: &'static str, bucket: &str, key: &str, message: &str) -> StorageError {
    StorageError {
        operation,
        bucket: bucket.into(),
        key: key.into(),
        request_id: None,
        source: message.to_string().into(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(lock(&self.buckets).contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.record(StoreCall::CreateBucket {
            bucket: bucket.into(),
        });
        lock(&self.buckets).entry(bucket.into()).or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.record(StoreCall::Put {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.check("put", bucket, key)?;
        lock(&self.buckets)
            .get_mut(bucket)
            .ok_or_else(|| error("put", bucket, key, "no such bucket"))?
            .insert(key.into(), body);
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, from: &str, to: &str) -> Result<(), StorageError> {
        self.record(StoreCall::Copy {
            bucket: bucket.into(),
            from: from.into(),
            to: to.into(),
        });
        self.check("copy", bucket, from)?;
        let mut buckets = lock(&self.buckets);
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| error("copy", bucket, from, "no such bucket"))?;
        let body = objects
            .get(from)
            .cloned()
            .ok_or_else(|| error("copy", bucket, from, "no such key"))?;
        objects.insert(to.into(), body);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.record(StoreCall::Delete {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.check("delete", bucket, key)?;
        if let Some(objects) = lock(&self.buckets).get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.object(bucket, key).is_some())
    }

    async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if !lock(&self.buckets).contains_key(bucket) {
            return Err(error("begin_upload", bucket, key, "no such bucket"));
        }
        let upload_id = uuid::Uuid::new_v4().to_string();
        lock(&self.uploads).insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.into(),
                key: key.into(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number: i32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        self.record(StoreCall::UploadPart {
            bucket: bucket.into(),
            key: key.into(),
            number,
        });
        self.check("part", bucket, key)?;
        let mut uploads = lock(&self.uploads);
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| error("upload_part", bucket, key, "no such upload"))?;
        upload.parts.insert(number, body);
        Ok(format!("\"{upload_id}-{number}\""))
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<(), StorageError> {
        self.record(StoreCall::CompleteUpload {
            bucket: bucket.into(),
            key: key.into(),
        });
        let mut upload = lock(&self.uploads)
            .remove(upload_id)
            .ok_or_else(|| error("complete_upload", bucket, key, "no such upload"))?;

        let mut body = Vec::new();
        for part in &parts {
            let chunk = upload
                .parts
                .remove(&part.number)
                .ok_or_else(|| error("complete_upload", bucket, key, "missing part"))?;
            body.extend_from_slice(&chunk);
        }
        lock(&self.buckets)
            .get_mut(&upload.bucket)
            .ok_or_else(|| error("complete_upload", bucket, key, "no such bucket"))?
            .insert(upload.key, Bytes::from(body));
        Ok(())
    }

    async fn abort_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.record(StoreCall::AbortUpload {
            bucket: bucket.into(),
            key: key.into(),
        });
        lock(&self.uploads).remove(upload_id);
        Ok(())
    }
}
