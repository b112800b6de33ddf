//! Request handling configuration.
//!
//! A [`Config`] is usually loaded once at startup and shared by every
//! [`RequestBuilder`](crate::RequestBuilder). All fields have defaults, so
//! an empty TOML document is a valid configuration.

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::path::Path;

/// The default body ceiling, 1MiB.
pub const DEFAULT_CLIENT_MAX_SIZE: usize = 1024 * 1024;

/// The header carrying an upstream request identity.
pub const FORWARDED_REQUEST_UID: &str = "X-FORWARDED-REQUEST-UID";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum body size in bytes. Zero disables the limit.
    pub client_max_size: usize,

    /// Charset used to decode bodies that don't declare one.
    pub default_charset: String,

    /// Header consulted for a forwarded request identity.
    pub uid_header: String,

    /// Whether `uid_header` is honored at all. Only enable this behind a
    /// proxy that strips the header from untrusted clients.
    pub trust_forwarded_uid: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            client_max_size: DEFAULT_CLIENT_MAX_SIZE,
            default_charset: "utf-8".to_owned(),
            uid_header: FORWARDED_REQUEST_UID.to_owned(),
            trust_forwarded_uid: true,
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Invalid(String),
}

impl Config {
    /// Parse and validate configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Config::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if crate::request::Charset::lookup(&self.default_charset).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unsupported default_charset '{}'",
                self.default_charset
            )));
        }

        if self.uid_header.is_empty()
            || !self
                .uid_header
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigError::Invalid(format!(
                "invalid uid_header '{}'",
                self.uid_header
            )));
        }

        Ok(())
    }
}
