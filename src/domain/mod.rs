mod account;
mod broadcast;
mod cached_response;
mod catalog;
mod content;
pub mod listing;
mod media;
mod otp_code;
mod subscription;
mod user;
mod user_email;

pub use account::{Code, ForgotPassword, ResetPassword, Transaction, TransactionStatus, CODE_TTL};
pub use broadcast::{Broadcast, EventPayload, WebhookEvent};
pub use cached_response::CachedResponse;
pub use catalog::{Category, NamedInput, Permission, Role};
pub use content::{title_key, Issue, IssueUpdate, Video, VideoStatus, VideoUpdate};
pub use listing::{ListParams, ListSpec, Page};
pub use media::{FileContent, MediaKind, UploadForm, UploadedFile};
pub use otp_code::OtpCode;
pub use subscription::{
    ContentType, Recurrence, Redemption, Subscription, SubscriptionRequest, SubscriptionStatus,
    MAX_ENTITLED_IDS,
};
pub use user::{validate_password, Address, FullName, PasswordChange, ProfileUpdate, SignIn, SignUp, User};
pub use user_email::UserEmail;
