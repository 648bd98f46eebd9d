//! Published content: PDF issues and videos.

use super::listing::{field, FieldValue, ListSpec, Listable, Sort};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    /// Object key stem shared by the PDF and its cover.
    pub key: String,
    pub description: Option<String>,
    pub order: i32,
    pub file: String,
    pub cover: String,
    pub paid: bool,
    pub views: i64,
    pub category_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Issue {
    pub const LISTING: ListSpec = ListSpec {
        filters: &[
            field("title", "title"),
            field("description", "description"),
            field("paid", "paid"),
            field("categoryId", "category_id"),
        ],
        sorts: &[
            field("title", "title"),
            field("order", "display_order"),
            field("views", "views"),
            field("createdAt", "created_at"),
        ],
        default_sort: Sort {
            column: "display_order",
            descending: false,
        },
    };
}

impl Listable for Issue {
    fn field(&self, column: &str) -> FieldValue {
        match column {
            "title" => self.title.as_str().into(),
            "description" => self.description.as_deref().into(),
            "display_order" => FieldValue::Number(self.order.into()),
            "paid" => FieldValue::Bool(self.paid),
            "views" => FieldValue::Number(self.views),
            "category_id" => self
                .category_id
                .map_or(FieldValue::Null, |id| FieldValue::Text(id.to_string())),
            "created_at" => FieldValue::Time(self.created_at),
            _ => FieldValue::Null,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoStatus {
    Draft,
    Published,
}

impl AsRef<str> for VideoStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            VideoStatus::Draft => "DRAFT",
            VideoStatus::Published => "PUBLISHED",
        }
    }
}

impl TryFrom<String> for VideoStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "DRAFT" => Ok(VideoStatus::Draft),
            "PUBLISHED" => Ok(VideoStatus::Published),
            other => Err(format!("`{other}` is not a valid variant of VideoStatus")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub key: String,
    pub description: Option<String>,
    pub uri: String,
    pub thumbnail: Option<String>,
    /// Length in seconds.
    pub duration: i32,
    pub for_sale: bool,
    pub paid: bool,
    pub status: VideoStatus,
    pub views: i64,
    pub category_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Video {
    pub const LISTING: ListSpec = ListSpec {
        filters: &[
            field("title", "title"),
            field("description", "description"),
            field("status", "status"),
            field("paid", "paid"),
            field("forSale", "for_sale"),
            field("categoryId", "category_id"),
        ],
        sorts: &[
            field("title", "title"),
            field("duration", "duration"),
            field("views", "views"),
            field("createdAt", "created_at"),
        ],
        default_sort: Sort {
            column: "created_at",
            descending: true,
        },
    };
}

impl Listable for Video {
    fn field(&self, column: &str) -> FieldValue {
        match column {
            "title" => self.title.as_str().into(),
            "description" => self.description.as_deref().into(),
            "status" => self.status.as_ref().into(),
            "paid" => FieldValue::Bool(self.paid),
            "for_sale" => FieldValue::Bool(self.for_sale),
            "duration" => FieldValue::Number(self.duration.into()),
            "views" => FieldValue::Number(self.views),
            "category_id" => self
                .category_id
                .map_or(FieldValue::Null, |id| FieldValue::Text(id.to_string())),
            "created_at" => FieldValue::Time(self.created_at),
            _ => FieldValue::Null,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub paid: Option<bool>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub paid: Option<bool>,
    pub for_sale: Option<bool>,
    pub duration: Option<i32>,
    pub status: Option<VideoStatus>,
    pub category_id: Option<Uuid>,
}

/// Derives the object key stem from a human title:
/// lowercase ASCII letters and digits joined by single dashes.
pub fn title_key(title: &str) -> Option<String> {
    let mut key = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('-') {
            key.push('-');
        }
    }
    while key.ends_with('-') {
        key.pop();
    }

    (!key.is_empty()).then_some(key)
}
