//! Process configuration.
//!
//! Everything is read once from the environment at startup (after an optional
//! `.env` file) and then shared read-only for the lifetime of the process.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials and call settings for the vision service.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub key: String,
    pub api_version: String,
    pub timeout: Duration,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = get("VISION_ENDPOINT").ok_or(ConfigError::Missing("VISION_ENDPOINT"))?;
        let key = get("VISION_KEY").ok_or(ConfigError::Missing("VISION_KEY"))?;

        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "VISION_ENDPOINT",
                reason: format!("expected an http(s) URL, got '{}'", endpoint),
            });
        }

        let api_version = get("VISION_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let timeout_secs = match get("VISION_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "VISION_TIMEOUT_SECS",
                        reason: format!("expected a positive integer, got '{}'", raw),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.trim().parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            name: "BIND_ADDR",
            reason: format!("'{}': {}", bind_raw, e),
        })?;

        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "MAX_BODY_BYTES",
                reason: format!("'{}': {}", raw, e),
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            vision: VisionConfig {
                endpoint,
                key,
                api_version,
                timeout: Duration::from_secs(timeout_secs),
            },
            server: ServerConfig {
                bind_addr,
                max_body_bytes,
            },
        })
    }
}
