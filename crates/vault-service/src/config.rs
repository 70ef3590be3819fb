//! Service configuration from `SERIAL_VAULT_*` environment variables

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

use crate::core::DEFAULT_NONCE_TTL_SECS;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_TTL_SECS: i64 = 3600;
const DEFAULT_STORE_URL: &str = "https://dashboard.snapcraft.io";

/// Upper bound for any lifetime setting: one year
const MAX_TTL_SECS: i64 = 365 * 24 * 3600;

/// A variable was set to something unusable
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Superuser created at startup if it does not exist
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub api_key: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

/// Serial vault configuration
#[derive(Clone)]
pub struct VaultConfig {
    pub port: u16,
    pub log_level: Level,
    /// Lifetime of issued request-ids
    pub nonce_ttl: Duration,
    /// HS256 secret for session tokens
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    /// Base URL of the external store
    pub store_url: String,
    pub database_url: Option<String>,
    pub admin: Option<AdminBootstrap>,
    /// Name logged at startup to tell instances apart
    pub instance: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("nonce_ttl", &self.nonce_ttl)
            .field("session_secret", &"[redacted]")
            .field("session_ttl", &self.session_ttl)
            .field("store_url", &self.store_url)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("admin", &self.admin)
            .field("instance", &self.instance)
            .finish()
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: Level::INFO,
            nonce_ttl: Duration::seconds(DEFAULT_NONCE_TTL_SECS),
            session_secret: random_secret(),
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            store_url: DEFAULT_STORE_URL.to_string(),
            database_url: None,
            admin: None,
            instance: format!("serial-vault-{}", uuid::Uuid::new_v4()),
        }
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
}

fn parse<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive_seconds(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(secs) = parse::<i64>(var, value)? else {
        return Ok(None);
    };

    let invalid = |reason: String| ConfigError::Invalid {
        var,
        value: secs.to_string(),
        reason,
    };
    if secs <= 0 {
        return Err(invalid("must be positive".into()));
    }
    if secs > MAX_TTL_SECS {
        return Err(invalid(format!("must be at most {} seconds", MAX_TTL_SECS)));
    }
    Duration::try_seconds(secs)
        .map(Some)
        .ok_or_else(|| invalid("out of range".into()))
}

impl VaultConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let admin = match (
            lookup("SERIAL_VAULT_ADMIN_USERNAME").filter(|v| !v.is_empty()),
            lookup("SERIAL_VAULT_ADMIN_API_KEY").filter(|v| !v.is_empty()),
        ) {
            (Some(username), Some(api_key)) => Some(AdminBootstrap { username, api_key }),
            (None, None) => None,
            (Some(username), None) => {
                return Err(ConfigError::Invalid {
                    var: "SERIAL_VAULT_ADMIN_API_KEY",
                    value: String::new(),
                    reason: format!("required when SERIAL_VAULT_ADMIN_USERNAME={} is set", username),
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Invalid {
                    var: "SERIAL_VAULT_ADMIN_USERNAME",
                    value: String::new(),
                    reason: "required when SERIAL_VAULT_ADMIN_API_KEY is set".into(),
                })
            }
        };

        Ok(Self {
            port: parse("SERIAL_VAULT_PORT", lookup("SERIAL_VAULT_PORT"))?.unwrap_or(defaults.port),
            log_level: parse("SERIAL_VAULT_LOG_LEVEL", lookup("SERIAL_VAULT_LOG_LEVEL"))?
                .unwrap_or(defaults.log_level),
            nonce_ttl: positive_seconds("SERIAL_VAULT_NONCE_TTL_SECS", lookup("SERIAL_VAULT_NONCE_TTL_SECS"))?
                .unwrap_or(defaults.nonce_ttl),
            session_secret: lookup("SERIAL_VAULT_SESSION_SECRET")
                .filter(|v| !v.is_empty())
                .map(String::into_bytes)
                .unwrap_or(defaults.session_secret),
            session_ttl: positive_seconds(
                "SERIAL_VAULT_SESSION_TTL_SECS",
                lookup("SERIAL_VAULT_SESSION_TTL_SECS"),
            )?
            .unwrap_or(defaults.session_ttl),
            store_url: lookup("SERIAL_VAULT_STORE_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.store_url),
            database_url: lookup("SERIAL_VAULT_DATABASE_URL").filter(|v| !v.is_empty()),
            admin,
            instance: lookup("SERIAL_VAULT_INSTANCE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.instance),
        })
    }
}
