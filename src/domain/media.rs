use crate::{
    errors::ApiError,
    storage::{BytesSource, ChunkSource, FileSource},
};
use axum::body::Bytes;
use std::collections::HashMap;
use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub size: u64,
    pub content: FileContent,
}

#[derive(Debug)]
pub enum FileContent {
    Memory(Bytes),
    /// Written to a temporary file that is removed on drop.
    Spooled(NamedTempFile),
}

impl UploadedFile {
    pub fn in_memory(file_name: &str, content_type: &str, bytes: Bytes) -> Self {
        Self {
            file_name: Some(file_name.to_owned()),
            content_type: content_type.to_owned(),
            size: bytes.len() as u64,
            content: FileContent::Memory(bytes),
        }
    }

    /// A fresh reader over the whole content.
    pub fn chunks(&self) -> std::io::Result<Box<dyn ChunkSource>> {
        Ok(match &self.content {
            FileContent::Memory(bytes) => Box::new(BytesSource::new(bytes.clone())),
            FileContent::Spooled(file) => Box::new(FileSource::new(tokio::fs::File::from_std(
                file.reopen()?,
            ))),
        })
    }
}

/// A parsed multipart form: named file parts plus plain text parts.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: HashMap<String, UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn flag(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(ApiError::validation(raw, format!("`{name}` must be a boolean."))),
            },
        }
    }

    pub fn number(&self, name: &str) -> Result<Option<i32>, ApiError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<i32>()
                    .ok()
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| {
                        ApiError::validation(raw, format!("`{name}` must be a positive number."))
                    })
            })
            .transpose()
    }

    pub fn uuid(&self, name: &str) -> Result<Option<uuid::Uuid>, ApiError> {
        self.text(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ApiError::validation(raw, format!("`{name}` must be a UUID.")))
            })
            .transpose()
    }
}

struct FileRule {
    field: &'static str,
    label: &'static str,
    allowed: &'static [&'static str],
    wrong_type: &'static str,
}

impl FileRule {
    fn check(&self, form: &UploadForm) -> Result<(), ApiError> {
        let file = form.files.get(self.field).ok_or_else(|| {
            ApiError::validation(self.field, format!("{} file is required.", self.label))
        })?;

        if !self.allowed.contains(&file.content_type.as_str()) {
            return Err(ApiError::validation(self.field, self.wrong_type));
        }

        if file.size == 0 {
            return Err(ApiError::validation(
                self.field,
                format!("{} file is empty.", self.label),
            ));
        }

        Ok(())
    }
}

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Issue,
    Video,
}

impl MediaKind {
    fn content_rule(&self) -> FileRule {
        match self {
            Self::Issue => FileRule {
                field: "issue",
                label: "Issue",
                allowed: &["application/pdf", "application/octet-stream"],
                wrong_type: "Issue must be a binary file.",
            },
            Self::Video => FileRule {
                field: "video",
                label: "Video",
                allowed: &["video/mp4", "video/quicktime", "video/webm", "video/x-matroska"],
                wrong_type: "Video must be a video file.",
            },
        }
    }

    fn image_rule(&self) -> FileRule {
        match self {
            Self::Issue => FileRule {
                field: "cover",
                label: "Cover",
                allowed: IMAGE_TYPES,
                wrong_type: "Cover must be an image.",
            },
            Self::Video => FileRule {
                field: "thumbnail",
                label: "Thumbnail",
                allowed: IMAGE_TYPES,
                wrong_type: "Thumbnail must be an image.",
            },
        }
    }

    /// Presence, MIME allow-list and non-zero size for both required files.
    pub fn validate(&self, form: &UploadForm) -> Result<(), ApiError> {
        self.content_rule().check(form)?;
        self.image_rule().check(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    fn file(content_type: &str, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile::in_memory("upload", content_type, Bytes::from_static(bytes))
    }

    fn form(files: Vec<(&str, UploadedFile)>) -> UploadForm {
        UploadForm {
            files: files
                .into_iter()
                .map(|(name, file)| (name.to_string(), file))
                .collect(),
            fields: HashMap::new(),
        }
    }

    fn message(error: ApiError) -> String {
        error.body().errors.remove(0).msg
    }

    #[test]
    fn a_complete_issue_upload_is_accepted() {
        // given
        let form = form(vec![
            ("issue", file("application/pdf", b"%PDF-1.7")),
            ("cover", file("image/jpeg", b"\xff\xd8")),
        ]);

        // then
        assert_ok!(MediaKind::Issue.validate(&form));
    }

    #[test]
    fn a_non_pdf_issue_is_rejected_with_the_binary_file_message() {
        // given
        let form = form(vec![
            ("issue", file("text/plain", b"hello")),
            ("cover", file("image/jpeg", b"\xff\xd8")),
        ]);

        // when
        let error = MediaKind::Issue.validate(&form).unwrap_err();

        // then
        assert_eq!(message(error), "Issue must be a binary file.");
    }

    #[test]
    fn missing_and_empty_files_are_rejected() {
        // given
        let missing_cover = form(vec![("issue", file("application/pdf", b"%PDF"))]);
        let empty_video = form(vec![
            ("video", file("video/mp4", b"")),
            ("thumbnail", file("image/png", b"\x89PNG")),
        ]);

        // then
        assert_eq!(
            message(MediaKind::Issue.validate(&missing_cover).unwrap_err()),
            "Cover file is required."
        );
        assert_eq!(
            message(MediaKind::Video.validate(&empty_video).unwrap_err()),
            "Video file is empty."
        );
    }

    #[test]
    fn a_non_image_thumbnail_is_rejected() {
        // given
        let form = form(vec![
            ("video", file("video/mp4", b"\x00\x00\x00\x18ftyp")),
            ("thumbnail", file("application/pdf", b"%PDF")),
        ]);

        // then
        assert_err!(MediaKind::Video.validate(&form));
    }

    #[test]
    fn text_fields_are_parsed() {
        // given
        let mut form = UploadForm::default();
        form.fields.insert("paid".into(), "true".into());
        form.fields.insert("duration".into(), "95".into());
        form.fields.insert("forSale".into(), "maybe".into());

        // then
        assert_eq!(form.flag("paid").unwrap(), Some(true));
        assert_eq!(form.number("duration").unwrap(), Some(95));
        assert_err!(form.flag("forSale"));
        assert_eq!(form.flag("missing").unwrap(), None);
    }
}
