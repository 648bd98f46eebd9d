//! Categories, roles and permissions: simple named entities.

use super::listing::{field, FieldValue, ListSpec, Listable, Sort};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct NamedInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Uuid>>,
}

impl NamedInput {
    /// Trimmed, non-empty name.
    pub fn required_name(&self) -> Result<String, String> {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err("Name is required.".into()),
        }
    }

    pub fn name(&self) -> Result<Option<String>, String> {
        match &self.name {
            None => Ok(None),
            Some(_) => self.required_name().map(Some),
        }
    }
}

macro_rules! listable_by_name {
    ($($entity:ty),*) => {
        $(
            impl $entity {
                pub const LISTING: ListSpec = ListSpec {
                    filters: &[field("name", "name"), field("description", "description")],
                    sorts: &[field("name", "name"), field("createdAt", "created_at")],
                    default_sort: Sort {
                        column: "name",
                        descending: false,
                    },
                };
            }

            impl Listable for $entity {
                fn field(&self, column: &str) -> FieldValue {
                    match column {
                        "name" => self.name.as_str().into(),
                        "description" => self.description.as_deref().into(),
                        "created_at" => FieldValue::Time(self.created_at),
                        _ => FieldValue::Null,
                    }
                }
            }
        )*
    };
}

listable_by_name!(Category, Permission, Role);
