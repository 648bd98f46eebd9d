use crate::{
    configuration::PasswordHashingSettings, domain::User, repository::UserRepository,
    telemetry::spawn_blocking_with_tracing,
};
use anyhow::Context;
use argon2::{
    password_hash::{self, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use secrecy::{ExposeSecret, Secret};

/// Verified against when the email is unknown, so both paths cost one hash.
const DUMMY_HASH: &str = "$argon2id$v=19$m=15000,t=2,p=1$\
gZiV/M1gPc22ElAH/Jh1Hw$\
CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

#[tracing::instrument(name = "Validate credentials", skip_all)]
pub async fn validate_credentials(
    users: &dyn UserRepository,
    credentials: Credentials,
) -> Result<User, AuthError> {
    let email = credentials.email.trim().to_lowercase();
    let user = users.find_by_email(&email).await?;

    let expected_password_hash = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(|| Secret::new(DUMMY_HASH.to_string()));

    spawn_blocking_with_tracing(move || {
        verify_password_hash(expected_password_hash, credentials.password)
    })
    .await
    .context("Failed to spawn blocking task")??;

    user.ok_or_else(|| AuthError::InvalidCredentials(anyhow::anyhow!("Unknown email")))
}

#[tracing::instrument(name = "Verify password hash", skip_all)]
pub fn verify_password_hash(
    expected_password_hash: Secret<String>,
    password_candidate: Secret<String>,
) -> Result<(), AuthError> {
    let expected_password_hash = PasswordHash::new(expected_password_hash.expose_secret())
        .context("Failed to parse hash in PHC string format")?;

    match Argon2::default().verify_password(
        password_candidate.expose_secret().as_bytes(),
        &expected_password_hash,
    ) {
        Ok(()) => Ok(()),
        Err(password_hash::Error::Password) => Err(AuthError::InvalidCredentials(
            anyhow::anyhow!("Invalid password"),
        )),
        Err(e) => Err(AuthError::UnexpectedError(anyhow::anyhow!(
            "Failed to verify the password hash: {e}"
        ))),
    }
}

/// Hashes on the blocking pool with the configured Argon2id cost.
pub async fn hash_password(
    password: Secret<String>,
    settings: &PasswordHashingSettings,
) -> Result<Secret<String>, anyhow::Error> {
    let settings = settings.clone();
    spawn_blocking_with_tracing(move || compute_password_hash(password, &settings))
        .await
        .context("Failed to spawn blocking task")?
}

pub fn compute_password_hash(
    password: Secret<String>,
    settings: &PasswordHashingSettings,
) -> Result<Secret<String>, anyhow::Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let params = Params::new(
        settings.memory_kib,
        settings.iterations,
        settings.parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid password hashing parameters: {e}"))?;

    let password_hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?
        .to_string();

    Ok(Secret::new(password_hash))
}
