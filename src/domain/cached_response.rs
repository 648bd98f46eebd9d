use time::OffsetDateTime;

/// A stored `200 OK` body for a collection endpoint, keyed by `path?query`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub expires_at: OffsetDateTime,
}

impl CachedResponse {
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}
