//! Entitlement bookkeeping for paid content.

use super::listing::{field, FieldValue, ListSpec, Listable, Sort};
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

/// Maximum number of content items a single subscription can unlock.
pub const MAX_ENTITLED_IDS: usize = 6;

pub const LIFE_TIME: &str = "LIFE-TIME";
pub const YEARLY: &str = "YEARLY";
pub const SINGLE_PRODUCT: &str = "single";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Issue,
    Video,
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &'static str {
        match self {
            ContentType::Issue => "issue",
            ContentType::Video => "video",
        }
    }
}

impl TryFrom<String> for ContentType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "issue" => Ok(ContentType::Issue),
            "video" => Ok(ContentType::Video),
            other => Err(format!("`{other}` is not a valid variant of ContentType")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recurrence {
    OneTime,
    Monthly,
    Yearly,
}

impl AsRef<str> for Recurrence {
    fn as_ref(&self) -> &'static str {
        match self {
            Recurrence::OneTime => "one-time",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        }
    }
}

impl TryFrom<String> for Recurrence {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "one-time" => Ok(Recurrence::OneTime),
            "monthly" => Ok(Recurrence::Monthly),
            "yearly" => Ok(Recurrence::Yearly),
            other => Err(format!("`{other}` is not a valid variant of Recurrence")),
        }
    }
}

/// Plan codes sold for video access. The code doubles as the access tier label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoPlan {
    Monthly,
    Yearly,
}

impl VideoPlan {
    pub fn parse(code: &str) -> Result<Self, String> {
        match code.trim().to_uppercase().as_str() {
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            _ => Err(format!("`{code}` is not a known video plan")),
        }
    }

    pub fn recurrence(&self) -> Recurrence {
        match self {
            Self::Monthly => Recurrence::Monthly,
            Self::Yearly => Recurrence::Yearly,
        }
    }

    pub fn end_date(&self, start: OffsetDateTime) -> Result<OffsetDateTime, String> {
        match self {
            Self::Monthly => add_months(start, 1),
            Self::Yearly => add_months(start, 12),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub recurring: Option<Recurrence>,
    pub product: String,
    #[serde(default)]
    pub ids: Vec<Uuid>,
    /// Owner, when an administrator purchases on behalf of a user.
    pub user: Option<Uuid>,
}

/// Unlocks one more content item on an existing subscription.
#[derive(Debug, Deserialize)]
pub struct Redemption {
    pub id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub recurring: Recurrence,
    pub ids: Vec<Uuid>,
    pub left: i32,
    pub access: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub purchase_date: OffsetDateTime,
}

impl Subscription {
    /// Builds a new entitlement from a purchase.
    pub fn purchase(
        user_id: Uuid,
        request: SubscriptionRequest,
        now: OffsetDateTime,
    ) -> Result<Self, String> {
        if request.ids.len() > MAX_ENTITLED_IDS {
            return Err(format!(
                "A subscription can hold at most {MAX_ENTITLED_IDS} items"
            ));
        }

        let (recurring, access, end_date, left) = match request.content_type {
            ContentType::Issue => {
                let left = if request.product == SINGLE_PRODUCT {
                    0
                } else {
                    slots_left(request.ids.len())
                };
                match request.recurring {
                    Some(Recurrence::OneTime) => (Recurrence::OneTime, LIFE_TIME.into(), None, left),
                    Some(Recurrence::Yearly) => (
                        Recurrence::Yearly,
                        YEARLY.into(),
                        Some(add_months(now, 12)?),
                        left,
                    ),
                    _ => return Err("Issue subscriptions must be one-time or yearly".into()),
                }
            }
            ContentType::Video => {
                let plan = VideoPlan::parse(&request.product)?;
                (
                    plan.recurrence(),
                    request.product.trim().to_string(),
                    Some(plan.end_date(now)?),
                    slots_left(request.ids.len()),
                )
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            content_type: request.content_type,
            recurring,
            ids: request.ids,
            left,
            access,
            start_date: now,
            end_date,
            purchase_date: now,
        })
    }

    /// Unlocks one more content item. Duplicates are accepted as-is.
    pub fn redeem(&mut self, content_id: Uuid) -> Result<(), String> {
        if self.ids.len() > MAX_ENTITLED_IDS - 1 {
            return Err(format!(
                "Subscription already unlocks the maximum of {MAX_ENTITLED_IDS} items"
            ));
        }
        self.ids.push(content_id);
        self.left = slots_left(self.ids.len());
        Ok(())
    }

    pub fn status(&self, now: OffsetDateTime) -> SubscriptionStatus {
        match self.end_date {
            Some(end) => SubscriptionStatus::between(end, now),
            None => SubscriptionStatus {
                months: None,
                weeks: None,
                message: "Subscription never ends".into(),
            },
        }
    }
}

impl Subscription {
    pub const LISTING: ListSpec = ListSpec {
        filters: &[
            field("type", "content_type"),
            field("recurring", "recurring"),
            field("access", "access"),
        ],
        sorts: &[
            field("startDate", "start_date"),
            field("purchaseDate", "purchase_date"),
            field("endDate", "end_date"),
        ],
        default_sort: Sort {
            column: "purchase_date",
            descending: true,
        },
    };
}

impl Listable for Subscription {
    fn field(&self, column: &str) -> FieldValue {
        match column {
            "content_type" => self.content_type.as_ref().into(),
            "recurring" => self.recurring.as_ref().into(),
            "access" => self.access.as_str().into(),
            "start_date" => FieldValue::Time(self.start_date),
            "purchase_date" => FieldValue::Time(self.purchase_date),
            "end_date" => self.end_date.map_or(FieldValue::Null, FieldValue::Time),
            _ => FieldValue::Null,
        }
    }
}

pub fn slots_left(count: usize) -> i32 {
    MAX_ENTITLED_IDS.saturating_sub(count) as i32
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SubscriptionStatus {
    pub months: Option<i64>,
    pub weeks: Option<i64>,
    pub message: String,
}

impl SubscriptionStatus {
    /// Reports months while at least one whole calendar month separates `now`
    /// from `end`, weeks when none does (even if `end` already passed), and
    /// the lag in months once `end` lies whole months behind.
    pub fn between(end: OffsetDateTime, now: OffsetDateTime) -> Self {
        let months = calendar_months_between(now, end);
        let weeks = (end - now).whole_weeks();

        let message = if months > 0 {
            format!("Subscription ends in {months} months")
        } else if months == 0 {
            format!("Subscription ends in {weeks} weeks")
        } else {
            format!("Subscription expired {} months ago", months.abs())
        };

        Self {
            months: Some(months),
            weeks: Some(weeks),
            message,
        }
    }
}

/// Signed number of complete calendar months lying strictly between the
/// months of `from` and `to`.
pub fn calendar_months_between(from: OffsetDateTime, to: OffsetDateTime) -> i64 {
    let index = |t: OffsetDateTime| i64::from(t.year()) * 12 + i64::from(u8::from(t.month()));
    let raw = index(to) - index(from);
    match raw {
        r if r > 0 => r - 1,
        r if r < 0 => r + 1,
        _ => 0,
    }
}

/// Adds calendar months, clamping the day to the length of the target month.
pub fn add_months(at: OffsetDateTime, months: u32) -> Result<OffsetDateTime, String> {
    let total = at.year() * 12 + i32::from(u8::from(at.month())) - 1 + months as i32;
    let year = total.div_euclid(12);
    let month = Month::try_from((total.rem_euclid(12) + 1) as u8).map_err(|e| e.to_string())?;
    let day = at.day().min(time::util::days_in_year_month(year, month));
    let date = Date::from_calendar_date(year, month, day).map_err(|e| e.to_string())?;
    Ok(at.replace_date(date))
}
