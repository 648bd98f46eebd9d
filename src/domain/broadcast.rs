use super::listing::{field, FieldValue, ListSpec, Listable, Sort};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const ARCHIVED: &str = "archived";
pub const REMOVE: &str = "remove";

/// Notification pushed by the broadcast provider.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event_id: String,
    pub action: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: EventPayload,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: Option<String>,
    pub player_url: Option<String>,
    pub collection_type: Option<String>,
}

impl WebhookEvent {
    pub fn is_removal(&self) -> bool {
        self.action.eq_ignore_ascii_case(REMOVE)
    }

    pub fn is_archived(&self) -> bool {
        self.kind.eq_ignore_ascii_case(ARCHIVED)
    }
}

/// Local mirror of the live event hosted by the provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub id: Uuid,
    /// Provider-side identifier of the live event.
    pub event_id: String,
    pub title: Option<String>,
    pub action: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub player_url: Option<String>,
    pub collection_type: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Broadcast {
    pub fn from_event(event: &WebhookEvent, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: event.event_id.clone(),
            title: event.payload.title.clone(),
            action: event.action.clone(),
            kind: event.kind.clone(),
            player_url: event.payload.player_url.clone(),
            collection_type: event.payload.collection_type.clone(),
            is_active: !event.is_archived(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds a provider event into the record and reports whether this event
    /// moved it into the archived state.
    pub fn apply(&mut self, event: &WebhookEvent, now: OffsetDateTime) -> bool {
        let was_active = self.is_active;

        self.action = event.action.clone();
        self.kind = event.kind.clone();
        self.player_url = event.payload.player_url.clone();
        if let Some(collection_type) = &event.payload.collection_type {
            self.collection_type = Some(collection_type.clone());
        }
        if let Some(title) = &event.payload.title {
            self.title = Some(title.clone());
        }
        if event.is_archived() {
            self.is_active = false;
        }
        self.updated_at = now;

        was_active && !self.is_active
    }
}

impl Broadcast {
    pub const LISTING: ListSpec = ListSpec {
        filters: &[
            field("eventId", "event_id"),
            field("title", "title"),
            field("type", "kind"),
        ],
        sorts: &[field("createdAt", "created_at")],
        default_sort: Sort {
            column: "created_at",
            descending: true,
        },
    };
}

impl Listable for Broadcast {
    fn field(&self, column: &str) -> FieldValue {
        match column {
            "event_id" => self.event_id.as_str().into(),
            "title" => self.title.as_deref().into(),
            "kind" => self.kind.as_str().into(),
            "is_active" => FieldValue::Bool(self.is_active),
            "created_at" => FieldValue::Time(self.created_at),
            _ => FieldValue::Null,
        }
    }
}
