use crate::{
    broadcast_client::{BroadcastClient, RetryPolicy},
    domain::UserEmail,
    email_client::EmailClient,
};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::time::Duration;
use tracing_log::log::LevelFilter;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub broadcast_provider: BroadcastProviderSettings,
    pub email_client: EmailClientSettings,
    pub uploads: UploadSettings,
    pub cache: CacheSettings,
}

#[derive(Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    /// Bearer tokens are only required when this is set.
    pub enforce_auth: bool,
    pub jwt_secret: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub token_expiry_hours: i64,
    pub password_hashing: PasswordHashingSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PasswordHashingSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub memory_kib: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub iterations: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub parallelism: u32,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            .log_statements(LevelFilter::Trace)
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode)
    }
}

#[derive(Clone, Deserialize)]
pub struct StorageSettings {
    pub region: String,
    /// Set for S3-compatible stores; enables path-style addressing.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<Secret<String>>,
    pub buckets: PerKind,
    pub cdn: PerKind,
}

/// One value per stored object kind: bucket names or CDN base URIs.
#[derive(Clone, Debug, Deserialize)]
pub struct PerKind {
    pub issues: String,
    pub covers: String,
    pub videos: String,
    pub thumbnails: String,
}

#[derive(Clone, Deserialize)]
pub struct BroadcastProviderSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_poll_attempts: u32,
}

impl BroadcastProviderSettings {
    pub fn client(&self) -> Result<BroadcastClient, reqwest::Error> {
        BroadcastClient::new(
            self.base_url.clone(),
            self.api_key.clone(),
            Duration::from_millis(self.timeout_milliseconds),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.poll_interval_milliseconds),
            max_attempts: self.max_poll_attempts,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct EmailClientSettings {
    pub base_url: String,
    sender_email: String,
    pub authorization_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<UserEmail, String> {
        UserEmail::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn client(&self) -> Result<EmailClient, anyhow::Error> {
        let sender = self.sender().map_err(anyhow::Error::msg)?;
        let client = EmailClient::new(
            self.base_url.clone(),
            sender,
            self.authorization_token.clone(),
            self.timeout(),
        )?;
        Ok(client)
    }
}

#[derive(Clone, Deserialize)]
pub struct UploadSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_issue_bytes: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_video_bytes: usize,
}

#[derive(Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub ttl_seconds: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config_dir = std::env::current_dir()
        .map(|dir| dir.join("configuration"))
        .map_err(|e| {
            config::ConfigError::Message(format!("Failed to determine the current directory: {e}"))
        })?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let env_config = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_dir.join("base.yaml")))
        .add_source(config::File::from(config_dir.join(env_config)))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "`{other}` is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}
