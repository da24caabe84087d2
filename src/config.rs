//! Configuration management for the reconciler service.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DEV_MODE` - Optional. Skip token checks and act as `DEV_USER_ID`. Defaults to `false`.
//! - `DEV_USER_ID` - Optional. Principal used in dev mode. Defaults to `dev-user`.
//! - `JWT_SECRET` - Required unless `DEV_MODE=true`. HS256 secret shared with the auth provider.
//! - `JWT_AUDIENCE` - Optional. Expected `aud` claim (e.g. `authenticated`).
//! - `STORE_TYPE` - Optional. `memory` or `sqlite`. Defaults to `sqlite`.
//! - `DATA_DIR` - Optional. Directory for the SQLite database. Defaults to `./data`.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Dev mode: every request acts as the configured dev user
    Disabled,
    /// Bearer JWT whose `sub` is the owner id
    Jwt,
}

/// Token verification settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens
    pub jwt_secret: Option<String>,

    /// Expected audience; audience is not checked when unset
    pub jwt_audience: Option<String>,

    /// Principal injected for every request in dev mode
    pub dev_user_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_audience: None,
            dev_user_id: "dev-user".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn auth_mode(&self, dev_mode: bool) -> AuthMode {
        if dev_mode {
            AuthMode::Disabled
        } else {
            AuthMode::Jwt
        }
    }

    pub fn auth_required(&self, dev_mode: bool) -> bool {
        self.auth_mode(dev_mode) != AuthMode::Disabled
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Bypass token verification
    pub dev_mode: bool,

    pub auth: AuthConfig,

    /// Storage backend
    pub store_type: StoreType,

    /// Directory holding persistent store files
    pub data_dir: PathBuf,
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            other.to_string(),
        )),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `JWT_SECRET` is not set outside
    /// dev mode, and `ConfigError::InvalidValue` for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let dev_mode = match lookup("DEV_MODE") {
            Some(value) => parse_bool("DEV_MODE", &value)?,
            None => false,
        };

        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.trim().is_empty());
        if !dev_mode && jwt_secret.is_none() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        let auth = AuthConfig {
            jwt_secret,
            jwt_audience: lookup("JWT_AUDIENCE").filter(|s| !s.trim().is_empty()),
            dev_user_id: lookup("DEV_USER_ID")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| AuthConfig::default().dev_user_id),
        };

        let store_type = lookup("STORE_TYPE")
            .map(|s| StoreType::from_str(&s))
            .unwrap_or_default();

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            host,
            port,
            dev_mode,
            auth,
            store_type,
            data_dir,
        })
    }

    /// Create a dev-mode config backed by the in-memory store (useful for testing).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            dev_mode: true,
            auth: AuthConfig::default(),
            store_type: StoreType::Memory,
            data_dir,
        }
    }
}
