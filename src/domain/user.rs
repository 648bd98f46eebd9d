use super::{
    listing::{field, FieldValue, ListSpec, Listable, Sort},
    UserEmail,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_NAME_GRAPHEMES: usize = 256;

/// Characters that only ever show up in a name as an injection attempt.
const MARKUP_CHARS: [char; 6] = ['<', '>', '"', '\\', '{', '}'];

/// A reader's display name, with runs of whitespace collapsed to one space.
#[derive(Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct FullName(String);

impl FullName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err("Full name must not be blank.".into());
        }
        if name.graphemes(true).count() > MAX_NAME_GRAPHEMES {
            return Err(format!(
                "Full name must be at most {MAX_NAME_GRAPHEMES} characters long."
            ));
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_control() || MARKUP_CHARS.contains(c))
        {
            return Err(format!("Full name must not contain {c:?}."));
        }
        Ok(Self(name))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for FullName {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Secret<String>,
    pub full_name: String,
    #[serde(flatten)]
    pub address: Address,
    pub is_admin: bool,
    pub role_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl Address {
    /// Overlays the fields present in `update`.
    pub fn merge(&mut self, update: Address) {
        let Address {
            address,
            city,
            postal_code,
            country,
            phone,
        } = update;
        if address.is_some() {
            self.address = address;
        }
        if city.is_some() {
            self.city = city;
        }
        if postal_code.is_some() {
            self.postal_code = postal_code;
        }
        if country.is_some() {
            self.country = country;
        }
        if phone.is_some() {
            self.phone = phone;
        }
    }
}

impl User {
    pub const LISTING: ListSpec = ListSpec {
        filters: &[
            field("email", "email"),
            field("fullName", "full_name"),
            field("city", "city"),
            field("country", "country"),
            field("isAdmin", "is_admin"),
        ],
        sorts: &[
            field("email", "email"),
            field("fullName", "full_name"),
            field("createdAt", "created_at"),
        ],
        default_sort: Sort {
            column: "created_at",
            descending: true,
        },
    };
}

impl Listable for User {
    fn field(&self, column: &str) -> FieldValue {
        match column {
            "email" => self.email.as_str().into(),
            "full_name" => self.full_name.as_str().into(),
            "city" => self.address.city.as_deref().into(),
            "country" => self.address.country.as_deref().into(),
            "is_admin" => FieldValue::Bool(self.is_admin),
            "created_at" => FieldValue::Time(self.created_at),
            _ => FieldValue::Null,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub email: UserEmail,
    pub password: Secret<String>,
    pub full_name: FullName,
    #[serde(flatten)]
    pub address: Address,
}

#[derive(Deserialize)]
pub struct SignIn {
    pub email: String,
    pub password: Secret<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub email: Option<UserEmail>,
    pub full_name: Option<FullName>,
    #[serde(flatten)]
    pub address: Address,
    /// Only honoured for administrators.
    pub is_admin: Option<bool>,
    pub role_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: Secret<String>,
    pub new_password: Secret<String>,
    pub new_password_check: Secret<String>,
}

pub fn validate_password(password: &Secret<String>) -> Result<(), String> {
    let length = password.expose_secret().chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long."
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters long."
        ));
    }

    Ok(())
}
