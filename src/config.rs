use std::{env, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

pub const DEFAULT_PORT: u16 = 5030;
pub const DEFAULT_BODY_LIMIT_MB: usize = 16;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("CAR_RECOGNITION_API_URL is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Settings read once at startup and handed to the components that need them.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    /// `None` when the external classifier is not configured.
    pub recognition_api_url: Option<Url>,
    pub upstream_timeout: Duration,
    pub max_upload_size_mb: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            recognition_api_url: None,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            max_upload_size_mb: DEFAULT_MAX_UPLOAD_SIZE_MB,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let body_limit_mb: usize = parse_var(
            &lookup,
            "BODY_LIMIT_MB",
            DEFAULT_BODY_LIMIT_MB,
            "a valid integer",
        )?;
        let port = parse_var(
            &lookup,
            "PORT",
            DEFAULT_PORT,
            "a valid number between 0 and 65535",
        )?;
        let timeout_secs = parse_var(
            &lookup,
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
            "a whole number of seconds",
        )?;
        let max_upload_size_mb: f64 = parse_var(
            &lookup,
            "MAX_UPLOAD_SIZE_MB",
            DEFAULT_MAX_UPLOAD_SIZE_MB,
            "a positive number",
        )?;
        if !(max_upload_size_mb > 0.0) {
            return Err(ConfigError::Invalid {
                name: "MAX_UPLOAD_SIZE_MB",
                expected: "a positive number",
                value: max_upload_size_mb.to_string(),
            });
        }

        let recognition_api_url = match lookup("CAR_RECOGNITION_API_URL") {
            Some(raw) if !raw.trim().is_empty() => Some(Url::parse(raw.trim())?),
            _ => None,
        };

        Ok(Config {
            port,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            recognition_api_url,
            upstream_timeout: Duration::from_secs(timeout_secs),
            max_upload_size_mb,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
        None => Ok(default),
    }
}
