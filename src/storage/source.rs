use async_trait::async_trait;
use axum::body::Bytes;
use tokio::{fs::File, io::AsyncReadExt};

/// Object content read chunk by chunk, so that large media never has to be
/// held in memory at once.
#[async_trait]
pub trait ChunkSource: Send {
    /// `None` once the content is exhausted.
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>>;
}

/// Content that is already in memory, yielded as a single chunk.
pub struct BytesSource(Option<Bytes>);

impl BytesSource {
    pub fn new(bytes: Bytes) -> Self {
        Self(Some(bytes))
    }
}

#[async_trait]
impl ChunkSource for BytesSource {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        Ok(self.0.take().filter(|bytes| !bytes.is_empty()))
    }
}

const READ_BUFFER: usize = 256 * 1024;

/// Content of a file on local disk.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut buffer = vec![0; READ_BUFFER];
        let read = self.file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        buffer.truncate(read);
        Ok(Some(Bytes::from(buffer)))
    }
}
