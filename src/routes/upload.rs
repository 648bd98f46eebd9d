use crate::{
    domain::{FileContent, UploadForm, UploadedFile},
    errors::ApiError,
    storage::PART_SIZE,
};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{multipart::Field, Multipart},
};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Reads a multipart body: parts with a file name become files, the rest text fields.
#[tracing::instrument(name = "Read multipart form", skip_all)]
pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_owned();
                let (size, content) = receive(field).await?;
                tracing::debug!(
                    %name,
                    size,
                    %content_type,
                    spooled = matches!(content, FileContent::Spooled(_)),
                    "Received file"
                );
                form.files.insert(
                    name,
                    UploadedFile {
                        file_name: Some(file_name),
                        content_type,
                        size,
                        content,
                    },
                );
            }
            None => {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

/// Keeps files of up to one storage part in memory and spools larger ones to disk.
async fn receive(mut field: Field<'_>) -> Result<(u64, FileContent), ApiError> {
    let mut size = 0u64;
    let mut buffer = Vec::new();
    let mut spool: Option<(NamedTempFile, tokio::fs::File)> = None;

    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        match spool.as_mut() {
            Some((_, file)) => file
                .write_all(&chunk)
                .await
                .context("Failed to spool an upload")?,
            None => {
                buffer.extend_from_slice(&chunk);
                if buffer.len() > PART_SIZE {
                    let temp = NamedTempFile::new().context("Failed to create a spool file")?;
                    let mut file = tokio::fs::File::from_std(
                        temp.reopen().context("Failed to open the spool file")?,
                    );
                    file.write_all(&buffer)
                        .await
                        .context("Failed to spool an upload")?;
                    buffer = Vec::new();
                    spool = Some((temp, file));
                }
            }
        }
    }

    let content = match spool {
        Some((temp, mut file)) => {
            file.flush().await.context("Failed to spool an upload")?;
            FileContent::Spooled(temp)
        }
        None => FileContent::Memory(Bytes::from(buffer)),
    };
    Ok((size, content))
}
