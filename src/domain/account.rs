use super::UserEmail;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const CODE_TTL: Duration = Duration::minutes(15);

/// Active password reset code. At most one exists per user.
#[derive(Clone, Debug)]
pub struct Code {
    pub user_id: Uuid,
    pub code: Secret<String>,
    pub expires_at: OffsetDateTime,
}

impl Code {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Sent,
    Failed,
}

impl AsRef<str> for TransactionStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            TransactionStatus::Sent => "sent",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "sent" => Ok(TransactionStatus::Sent),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!(
                "`{other}` is not a valid variant of TransactionStatus"
            )),
        }
    }
}

/// Audit record of a notification attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub status: TransactionStatus,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Deserialize)]
pub struct ForgotPassword {
    pub email: UserEmail,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPassword {
    pub email: UserEmail,
    pub code: String,
    pub new_password: Secret<String>,
}
