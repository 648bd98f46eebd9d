use super::ensure_owner;
use crate::{
    authentication::{
        hash_password, validate_credentials, AuthError, AuthenticatedUser, Credentials,
        TokenIssuer,
    },
    configuration::PasswordHashingSettings,
    domain::{
        validate_password, Code, ForgotPassword, ListParams, OtpCode, Page, PasswordChange,
        ProfileUpdate, ResetPassword, SignIn, SignUp, Transaction, TransactionStatus, User,
        UserEmail, CODE_TTL,
    },
    email_client::{EmailClient, Message},
    errors::ApiError,
    repository::{CodeRepository, RoleRepository, TransactionRepository, UserRepository},
};
use anyhow::Context;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

pub const PASSWORD_RESET_TAG: &str = "password-reset";

const INVALID_CODE: &str = "Reset code is invalid or expired.";

/// Answer to a successful sign-in.
#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    roles: Arc<RoleRepository>,
    codes: Arc<dyn CodeRepository>,
    transactions: Arc<dyn TransactionRepository>,
    email_client: EmailClient,
    tokens: TokenIssuer,
    hashing: PasswordHashingSettings,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<RoleRepository>,
        codes: Arc<dyn CodeRepository>,
        transactions: Arc<dyn TransactionRepository>,
        email_client: EmailClient,
        tokens: TokenIssuer,
        hashing: PasswordHashingSettings,
    ) -> Self {
        Self {
            users,
            roles,
            codes,
            transactions,
            email_client,
            tokens,
            hashing,
        }
    }

    #[tracing::instrument(
        name = "Sign up",
        skip(self, form),
        fields(user_email = %form.email)
    )]
    pub async fn sign_up(&self, form: SignUp) -> Result<User, ApiError> {
        validate_password(&form.password).map_err(|msg| ApiError::validation("password", msg))?;
        self.ensure_email_is_free(&form.email).await?;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: form.email.as_ref().to_string(),
            password_hash: hash_password(form.password, &self.hashing).await?,
            full_name: form.full_name.into_inner(),
            address: form.address,
            is_admin: false,
            role_id: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(&user).await?;

        Ok(user)
    }

    #[tracing::instrument(
        name = "Sign in",
        skip(self, form),
        fields(user_email = %form.email, user_id = tracing::field::Empty)
    )]
    pub async fn sign_in(&self, form: SignIn) -> Result<Session, ApiError> {
        let credentials = Credentials {
            email: form.email,
            password: form.password,
        };

        let user = validate_credentials(self.users.as_ref(), credentials)
            .await
            .map_err(|e| match e {
                AuthError::InvalidCredentials(_) => {
                    ApiError::Unauthorized("Invalid email or password".into())
                }
                AuthError::UnexpectedError(e) => ApiError::Unexpected(e),
            })?;
        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        let token = self
            .tokens
            .issue(&user)
            .context("Failed to sign a bearer token")?;

        Ok(Session { token, user })
    }

    #[tracing::instrument(name = "Get user", skip(self, actor))]
    pub async fn get(&self, actor: Option<&AuthenticatedUser>, id: Uuid) -> Result<User, ApiError> {
        ensure_owner(actor, id)?;
        self.users
            .find(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))
    }

    #[tracing::instrument(name = "List users", skip(self))]
    pub async fn list(&self, params: &ListParams) -> Result<Page<User>, ApiError> {
        Ok(self.users.list(params).await?)
    }

    #[tracing::instrument(name = "Update profile", skip(self, actor, update))]
    pub async fn update_profile(
        &self,
        actor: Option<&AuthenticatedUser>,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, ApiError> {
        let mut user = self.get(actor, id).await?;
        let may_grant = actor.map_or(true, AuthenticatedUser::is_admin);

        if let Some(email) = update.email {
            if email.as_ref() != user.email {
                self.ensure_email_is_free(&email).await?;
                user.email = email.as_ref().to_string();
            }
        }
        if let Some(full_name) = update.full_name {
            user.full_name = full_name.into_inner();
        }
        user.address.merge(update.address);

        if update.is_admin.is_some() || update.role_id.is_some() {
            if !may_grant {
                return Err(ApiError::Forbidden(
                    "Only administrators may change roles".into(),
                ));
            }
            if let Some(is_admin) = update.is_admin {
                user.is_admin = is_admin;
            }
            if let Some(role_id) = update.role_id {
                if self.roles.find(role_id).await?.is_none() {
                    return Err(ApiError::not_found("Role"));
                }
                user.role_id = Some(role_id);
            }
        }

        user.updated_at = OffsetDateTime::now_utc();
        self.users.update(&user).await?;

        Ok(user)
    }

    #[tracing::instrument(name = "Change password", skip(self, actor, change))]
    pub async fn change_password(
        &self,
        actor: Option<&AuthenticatedUser>,
        id: Uuid,
        change: PasswordChange,
    ) -> Result<(), ApiError> {
        let user = self.get(actor, id).await?;

        if change.new_password.expose_secret() != change.new_password_check.expose_secret() {
            return Err(ApiError::validation(
                "newPasswordCheck",
                "You entered two different new passwords - the field values must match.",
            ));
        }
        validate_password(&change.new_password)
            .map_err(|msg| ApiError::validation("newPassword", msg))?;

        let credentials = Credentials {
            email: user.email.clone(),
            password: change.current_password,
        };
        validate_credentials(self.users.as_ref(), credentials)
            .await
            .map_err(|e| match e {
                AuthError::InvalidCredentials(_) => {
                    ApiError::rule("currentPassword", "The current password is incorrect.")
                }
                AuthError::UnexpectedError(e) => ApiError::Unexpected(e),
            })?;

        self.store_password(user, change.new_password).await
    }

    /// Removes the user, their subscriptions and any pending reset code.
    #[tracing::instrument(name = "Delete user", skip(self, actor))]
    pub async fn delete(&self, actor: Option<&AuthenticatedUser>, id: Uuid) -> Result<(), ApiError> {
        ensure_owner(actor, id)?;
        if self.users.delete(id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found("User"))
        }
    }

    /// Emails a one-time code. Unknown addresses are answered the same way,
    /// without sending anything.
    #[tracing::instrument(
        name = "Request password reset",
        skip(self, form),
        fields(user_email = %form.email)
    )]
    pub async fn request_password_reset(&self, form: ForgotPassword) -> Result<(), ApiError> {
        let Some(user) = self.users.find_by_email(form.email.as_ref()).await? else {
            tracing::info!("Password reset requested for an unknown email");
            return Ok(());
        };

        let otp = OtpCode::generate();
        let now = OffsetDateTime::now_utc();
        self.codes
            .upsert(&Code {
                user_id: user.id,
                code: Secret::new(otp.expose_secret().clone()),
                expires_at: now + CODE_TTL,
            })
            .await?;

        let minutes = CODE_TTL.whole_minutes();
        let html_body = format!(
            "Your password reset code is <b>{}</b>.<br />It expires in {minutes} minutes.",
            otp.expose_secret()
        );
        let text_body = format!(
            "Your password reset code is {}.\nIt expires in {minutes} minutes.",
            otp.expose_secret()
        );
        let sent = self
            .email_client
            .send_email(
                &form.email,
                Message {
                    tag: PASSWORD_RESET_TAG,
                    subject: "Password reset code",
                    html_body: &html_body,
                    text_body: &text_body,
                },
            )
            .await;

        let (status, error) = match &sent {
            Ok(()) => (TransactionStatus::Sent, None),
            Err(e) => (TransactionStatus::Failed, Some(e.to_string())),
        };
        self.transactions
            .insert(&Transaction {
                id: Uuid::new_v4(),
                user_id: user.id,
                kind: PASSWORD_RESET_TAG.into(),
                recipient: form.email.as_ref().to_string(),
                status,
                error,
                created_at: now,
            })
            .await?;

        sent.context("Failed to send the password reset email")?;
        Ok(())
    }

    #[tracing::instrument(
        name = "Reset password",
        skip(self, form),
        fields(user_email = %form.email)
    )]
    pub async fn reset_password(&self, form: ResetPassword) -> Result<(), ApiError> {
        let otp = OtpCode::parse(form.code).map_err(|msg| ApiError::validation("code", msg))?;
        validate_password(&form.new_password)
            .map_err(|msg| ApiError::validation("newPassword", msg))?;

        let user = self
            .users
            .find_by_email(form.email.as_ref())
            .await?
            .ok_or_else(|| ApiError::rule("code", INVALID_CODE))?;
        let code = self
            .codes
            .find(user.id)
            .await?
            .ok_or_else(|| ApiError::rule("code", INVALID_CODE))?;

        if code.is_expired(OffsetDateTime::now_utc()) {
            self.codes.delete(user.id).await?;
            return Err(ApiError::rule("code", INVALID_CODE));
        }
        if !otp.matches(code.code.expose_secret()) {
            return Err(ApiError::rule("code", INVALID_CODE));
        }

        let user_id = user.id;
        self.store_password(user, form.new_password).await?;
        self.codes.delete(user_id).await?;

        Ok(())
    }

    async fn store_password(&self, mut user: User, password: Secret<String>) -> Result<(), ApiError> {
        user.password_hash = hash_password(password, &self.hashing).await?;
        user.updated_at = OffsetDateTime::now_utc();
        self.users.update(&user).await?;
        Ok(())
    }

    async fn ensure_email_is_free(&self, email: &UserEmail) -> Result<(), ApiError> {
        match self.users.find_by_email(email.as_ref()).await? {
            Some(_) => Err(ApiError::rule(
                email.as_ref(),
                "A user with this email already exists.",
            )),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Address, FullName},
        repository::InMemory,
    };
    use claims::{assert_err, assert_ok, assert_some};
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    struct Fixture {
        service: UserService,
        backend: Arc<InMemory>,
        email_server: MockServer,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(InMemory::default());
        let email_server = MockServer::start().await;
        let email_client = EmailClient::new(
            email_server.uri(),
            UserEmail::parse("desk@pressroom.example".into()).unwrap(),
            Secret::new("token".into()),
            Duration::from_millis(200),
        )
        .unwrap();

        let service = UserService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            email_client,
            TokenIssuer::new(&Secret::new("signing-secret".into()), 1),
            PasswordHashingSettings {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
        );

        Fixture {
            service,
            backend,
            email_server,
        }
    }

    fn sign_up_form(email: &str, password: &str) -> SignUp {
        SignUp {
            email: UserEmail::parse(email.into()).unwrap(),
            password: Secret::new(password.into()),
            full_name: FullName::parse("Jane Doe").unwrap(),
            address: Address::default(),
        }
    }

    #[tokio::test]
    async fn emails_can_only_be_registered_once() {
        // given
        let Fixture { service, .. } = fixture().await;
        assert_ok!(service.sign_up(sign_up_form("jane@example.com", "long enough")).await);

        // when
        let outcome = service
            .sign_up(sign_up_form("JANE@example.com", "long enough"))
            .await;

        // then
        assert!(matches!(outcome, Err(ApiError::BusinessRule { .. })));
    }

    #[tokio::test]
    async fn short_passwords_are_rejected_at_sign_up() {
        // given
        let Fixture { service, .. } = fixture().await;

        // then
        assert!(matches!(
            service.sign_up(sign_up_form("jane@example.com", "short")).await,
            Err(ApiError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn signing_in_yields_a_token_for_the_user() {
        // given
        let Fixture { service, .. } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();

        // when
        let session = assert_ok!(
            service
                .sign_in(SignIn {
                    email: "jane@example.com".into(),
                    password: Secret::new("long enough".into()),
                })
                .await
        );

        // then
        assert_eq!(session.user.id, user.id);
        assert_eq!(service.tokens.decode(&session.token).unwrap().sub, user.id);
        assert!(matches!(
            service
                .sign_in(SignIn {
                    email: "jane@example.com".into(),
                    password: Secret::new("wrong one".into()),
                })
                .await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn readers_cannot_make_themselves_admins() {
        // given
        let Fixture { service, .. } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();
        let actor = AuthenticatedUser(user.clone());

        // when
        let outcome = service
            .update_profile(
                Some(&actor),
                user.id,
                ProfileUpdate {
                    email: None,
                    full_name: None,
                    address: Address::default(),
                    is_admin: Some(true),
                    role_id: None,
                },
            )
            .await;

        // then
        assert!(matches!(outcome, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn a_reset_code_is_mailed_and_audited() {
        // given
        let Fixture {
            service,
            backend,
            email_server,
        } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();
        Mock::given(path("/email"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&email_server)
            .await;

        // when
        let outcome = service
            .request_password_reset(ForgotPassword {
                email: UserEmail::parse("jane@example.com".into()).unwrap(),
            })
            .await;

        // then
        assert_ok!(outcome);
        assert_some!(CodeRepository::find(backend.as_ref(), user.id).await.unwrap());
        let audit = TransactionRepository::list_for_user(backend.as_ref(), user.id)
            .await
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, TransactionStatus::Sent);
    }

    #[tokio::test]
    async fn a_failed_delivery_is_audited_as_failed() {
        // given
        let Fixture {
            service,
            backend,
            email_server,
        } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();
        Mock::given(path("/email"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&email_server)
            .await;

        // when
        let outcome = service
            .request_password_reset(ForgotPassword {
                email: UserEmail::parse("jane@example.com".into()).unwrap(),
            })
            .await;

        // then
        assert_err!(outcome);
        let audit = TransactionRepository::list_for_user(backend.as_ref(), user.id)
            .await
            .unwrap();
        assert_eq!(audit[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn a_valid_code_resets_the_password_once() {
        // given
        let Fixture {
            service, backend, ..
        } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();
        CodeRepository::upsert(
            backend.as_ref(),
            &Code {
                user_id: user.id,
                code: Secret::new("123456".into()),
                expires_at: OffsetDateTime::now_utc() + CODE_TTL,
            },
        )
        .await
        .unwrap();
        let reset = || ResetPassword {
            email: UserEmail::parse("jane@example.com".into()).unwrap(),
            code: "123456".into(),
            new_password: Secret::new("brand new password".into()),
        };

        // when
        assert_ok!(service.reset_password(reset()).await);

        // then
        assert_ok!(
            service
                .sign_in(SignIn {
                    email: "jane@example.com".into(),
                    password: Secret::new("brand new password".into()),
                })
                .await
        );
        assert!(matches!(
            service.reset_password(reset()).await,
            Err(ApiError::BusinessRule { .. })
        ));
    }

    #[tokio::test]
    async fn expired_codes_are_rejected() {
        // given
        let Fixture {
            service, backend, ..
        } = fixture().await;
        let user = service
            .sign_up(sign_up_form("jane@example.com", "long enough"))
            .await
            .unwrap();
        CodeRepository::upsert(
            backend.as_ref(),
            &Code {
                user_id: user.id,
                code: Secret::new("123456".into()),
                expires_at: OffsetDateTime::now_utc() - time::Duration::minutes(1),
            },
        )
        .await
        .unwrap();

        // when
        let outcome = service
            .reset_password(ResetPassword {
                email: UserEmail::parse("jane@example.com".into()).unwrap(),
                code: "123456".into(),
                new_password: Secret::new("brand new password".into()),
            })
            .await;

        // then
        assert!(matches!(outcome, Err(ApiError::BusinessRule { .. })));
    }
}
