// ABOUTME: Configuration loading and validation for the fieldtrail server.
// ABOUTME: Reads environment variables with defaults; retention policy is always externally configured.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FIELDTRAIL_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("{0} is not a valid number: {1}")]
    InvalidNumber(&'static str, String),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct FieldtrailConfig {
    pub home: PathBuf,
    pub bind: SocketAddr,
    /// How long a soft-deleted user stays purgeable-but-present. A policy
    /// decision that differs per deployment, so it is never hardcoded.
    pub grace_secs: u64,
    pub sweep_secs: u64,
    pub history_limit: usize,
}

impl FieldtrailConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - FIELDTRAIL_HOME: data directory (default: ~/.fieldtrail)
    /// - FIELDTRAIL_BIND: socket address to bind (default: 127.0.0.1:7412)
    /// - FIELDTRAIL_GRACE_SECS: grace window before permanent purge (default: 86400)
    /// - FIELDTRAIL_SWEEP_SECS: reaper sweep interval (default: 5)
    /// - FIELDTRAIL_HISTORY_LIMIT: max events per history read (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("FIELDTRAIL_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".fieldtrail")
            });

        let bind_str =
            std::env::var("FIELDTRAIL_BIND").unwrap_or_else(|_| "127.0.0.1:7412".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let grace_secs = parse_env("FIELDTRAIL_GRACE_SECS", 86400)?;
        let sweep_secs = parse_env("FIELDTRAIL_SWEEP_SECS", 5)?;
        let history_limit = parse_env("FIELDTRAIL_HISTORY_LIMIT", 100)?;

        Ok(Self {
            home,
            bind,
            grace_secs,
            sweep_secs,
            history_limit,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name, value)),
        Err(_) => Ok(default),
    }
}
