use serde::{Deserialize, Serialize};
use validator::validate_email;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct UserEmail(String);

impl UserEmail {
    /// Emails are compared case-insensitively, so they are stored lowercased.
    pub fn parse(s: String) -> Result<UserEmail, String> {
        let s = s.trim().to_lowercase();
        if validate_email(&s) {
            Ok(Self(s))
        } else {
            Err(format!("`{s}` email has invalid format"))
        }
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for UserEmail {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<UserEmail> for String {
    fn from(email: UserEmail) -> Self {
        email.0
    }
}
