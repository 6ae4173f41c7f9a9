//! Server configuration module.
//!
//! Parses configuration from environment variables for the EventDesk server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 8080 | HTTP server port |
//! | `EVENTDESK_CORS_ORIGINS` | No | - | Comma-separated list of exact allowed origins |
//! | `EVENTDESK_TOKEN_KEY` | Yes* | - | Base64 32-byte Ed25519 seed for bearer tokens |
//! | `EVENTDESK_TOKEN_TTL_SECS` | No | 86400 | Bearer token lifetime |
//! | `EVENTDESK_LOGIN_CODE_TTL_SECS` | No | 600 | Passwordless login code lifetime |
//! | `EVENTDESK_SESSIONIZE_URL` | No | `https://sessionize.com` | Sessionize API base URL |
//! | `EVENTDESK_DEV_MODE` | No | false | Allow a random per-process token key (dev only) |
//!
//! *Not required if `EVENTDESK_DEV_MODE=true`

use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::warn;

use crate::auth::SEED_LENGTH;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default bearer token lifetime (24 hours).
const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;

/// Default login code lifetime (10 minutes).
const DEFAULT_LOGIN_CODE_TTL_SECS: u64 = 600;

/// Default Sessionize API base URL.
pub const DEFAULT_SESSIONIZE_URL: &str = "https://sessionize.com";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Origins allowed to make cross-origin requests. Matched exactly.
    pub cors_origins: Vec<String>,

    /// Base64-encoded Ed25519 seed used to sign bearer tokens. `None` only in
    /// dev mode.
    pub token_key: Option<String>,

    pub token_ttl: Duration,

    pub login_code_ttl: Duration,

    pub sessionize_url: String,

    /// When true, a missing token key is replaced by an ephemeral one.
    pub dev_mode: bool,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `EVENTDESK_TOKEN_KEY` is missing and dev mode is off
    /// - the token key is not base64 of exactly 32 bytes
    /// - a numeric variable does not parse
    ///
    /// # Example
    ///
    /// ```no_run
    /// use eventdesk_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let dev_mode = parse_bool_env("EVENTDESK_DEV_MODE");
        let port = parse_port()?;
        let cors_origins = parse_origins();
        let token_key = env::var("EVENTDESK_TOKEN_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let token_ttl = parse_secs("EVENTDESK_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        let login_code_ttl =
            parse_secs("EVENTDESK_LOGIN_CODE_TTL_SECS", DEFAULT_LOGIN_CODE_TTL_SECS)?;
        let sessionize_url = env::var("EVENTDESK_SESSIONIZE_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSIONIZE_URL.to_string());

        let config = Self {
            port,
            cors_origins,
            token_key,
            token_ttl,
            login_code_ttl,
            sessionize_url,
            dev_mode,
        };

        config.validate()?;

        if config.dev_mode && config.token_key.is_none() {
            warn!(
                "EVENTDESK_DEV_MODE is enabled without EVENTDESK_TOKEN_KEY - tokens are \
                 signed with a random key and will not survive a restart. \
                 Do not use in production!"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match &self.token_key {
            None if self.dev_mode => Ok(()),
            None => Err(ConfigError::MissingEnvVar("EVENTDESK_TOKEN_KEY".to_string())),
            Some(key) => {
                let bytes = STANDARD
                    .decode(key)
                    .map_err(|e| ConfigError::InvalidFormat {
                        var: "EVENTDESK_TOKEN_KEY".to_string(),
                        message: format!("not valid base64: {e}"),
                    })?;
                if bytes.len() != SEED_LENGTH {
                    return Err(ConfigError::InvalidFormat {
                        var: "EVENTDESK_TOKEN_KEY".to_string(),
                        message: format!(
                            "expected {SEED_LENGTH} bytes, got {}",
                            bytes.len()
                        ),
                    });
                }
                Ok(())
            }
        }
    }
}

impl Default for Config {
    /// Dev-mode defaults; never reads the environment.
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            token_key: None,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            login_code_ttl: Duration::from_secs(DEFAULT_LOGIN_CODE_TTL_SECS),
            sessionize_url: DEFAULT_SESSIONIZE_URL.to_string(),
            dev_mode: true,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("cors_origins", &self.cors_origins)
            .field("token_key", &self.token_key.as_ref().map(|_| "<redacted>"))
            .field("token_ttl", &self.token_ttl)
            .field("login_code_ttl", &self.login_code_ttl)
            .field("sessionize_url", &self.sessionize_url)
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse a duration given in whole seconds. Zero is rejected.
fn parse_secs(name: &str, default: u64) -> Result<Duration, ConfigError> {
    let raw = match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Duration::from_secs(default)),
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Parse the EVENTDESK_CORS_ORIGINS environment variable.
///
/// Expected format: `https://a.example.com,https://b.example.com`.
/// Trailing slashes are removed so entries compare equal to `Origin` headers.
fn parse_origins() -> Vec<String> {
    let raw = match env::var("EVENTDESK_CORS_ORIGINS") {
        Ok(s) if !s.is_empty() => s,
        _ => return Vec::new(),
    };

    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',') {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() || origins.iter().any(|o| o == origin) {
            continue;
        }
        origins.push(origin.to_string());
    }
    origins
}
