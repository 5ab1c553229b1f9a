use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::error::ConfigError;

/// Placeholder secrets that must never reach a running server.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme", "secret", "jwt-secret"];
const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    /// Seed administrator; seeding is skipped entirely when absent.
    #[serde(default)]
    pub admin: Option<AdminSettings>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

impl DatabaseSettings {
    /// Server-level options, used to create databases.
    pub fn without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }

    /// Lazily connected pool; store calls are bounded by the acquire timeout.
    pub fn pool(&self) -> PgPool {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(self.acquire_timeout_seconds))
            .connect_lazy_with(self.connect_options())
    }
}

/// Token signing and cookie settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    /// Shared HMAC secret. No default: startup fails without one.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64, // seconds (900 = 15 minutes)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64, // seconds (604800 = 7 days)
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_cookie_name")]
    pub refresh_cookie_name: String,
    #[serde(default)]
    pub cookie_secure: bool,
}

impl JwtSettings {
    /// Reject settings that would make tokens forgeable or nonsensical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if PLACEHOLDER_SECRETS.contains(&secret.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue(
                "jwt.secret is a placeholder value".to_string(),
            ));
        }
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if self.access_token_expiry >= self.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "access_token_expiry must be shorter than refresh_token_expiry".to_string(),
            ));
        }
        if self.refresh_cookie_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "jwt.refresh_cookie_name".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct AdminSettings {
    pub username: String,
    pub email: String,
    pub password: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_access_expiry() -> i64 {
    900
}

fn default_refresh_expiry() -> i64 {
    604_800
}

fn default_issuer() -> String {
    "account-service".to_string()
}

fn default_cookie_name() -> String {
    "refresh_token".to_string()
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP_`-prefixed environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            access_token_expiry: default_access_expiry(),
            refresh_token_expiry: default_refresh_expiry(),
            issuer: default_issuer(),
            refresh_cookie_name: default_cookie_name(),
            cookie_secure: false,
        }
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        assert!(matches!(
            jwt("").validate(),
            Err(ConfigError::MissingRequired(_))
        ));
        assert!(matches!(
            jwt("   ").validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_placeholder_secret_is_rejected() {
        assert!(matches!(
            jwt("change-me").validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(jwt("too-short").validate().is_err());
    }

    #[test]
    fn test_expiry_ordering() {
        let mut settings = jwt("an-adequately-long-signing-secret-value");
        assert!(settings.validate().is_ok());

        settings.access_token_expiry = settings.refresh_token_expiry;
        assert!(settings.validate().is_err());

        settings.access_token_expiry = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_access_expiry(), 15 * 60);
        assert_eq!(default_refresh_expiry(), 168 * 60 * 60);
        assert_eq!(default_cookie_name(), "refresh_token");
    }
}
