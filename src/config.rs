//! Session configuration read from the environment

use crate::session::{
    PollingConfig, DEFAULT_MAX_REPO_SIZE_BYTES, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ITERATIONS,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Retry budget a new session starts with
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Settings shared by every conversation of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub workspace_root: PathBuf,
    /// Base URL of the job service; `None` means no service is configured
    pub endpoint: Option<String>,
    pub polling: PollingConfig,
    pub max_repo_size_bytes: u64,
    pub retries: u32,
}

impl SessionConfig {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            endpoint: None,
            polling: PollingConfig::default(),
            max_repo_size_bytes: DEFAULT_MAX_REPO_SIZE_BYTES,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Read the `WEAVERBIRD_*` variables of the process environment
    ///
    /// # Errors
    ///
    /// Fails when a numeric variable is malformed or zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Same as [`SessionConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let workspace_root = lookup("WEAVERBIRD_WORKSPACE")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let interval_ms = parse_number(
            &lookup,
            "WEAVERBIRD_POLL_INTERVAL_MS",
            u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(u64::MAX),
        )?;
        let max_iterations = parse_number(
            &lookup,
            "WEAVERBIRD_POLL_MAX_ITERATIONS",
            u64::from(DEFAULT_POLL_MAX_ITERATIONS),
        )?;
        let max_iterations = u32::try_from(max_iterations).map_err(|_| ConfigError::InvalidNumber {
            name: "WEAVERBIRD_POLL_MAX_ITERATIONS",
            value: max_iterations.to_string(),
        })?;
        if max_iterations == 0 {
            return Err(ConfigError::Zero {
                name: "WEAVERBIRD_POLL_MAX_ITERATIONS",
            });
        }

        let max_repo_size_bytes = parse_number(
            &lookup,
            "WEAVERBIRD_MAX_REPO_SIZE_BYTES",
            DEFAULT_MAX_REPO_SIZE_BYTES,
        )?;
        let retries = parse_number(&lookup, "WEAVERBIRD_RETRIES", u64::from(DEFAULT_RETRIES))?;
        let retries = u32::try_from(retries).map_err(|_| ConfigError::InvalidNumber {
            name: "WEAVERBIRD_RETRIES",
            value: retries.to_string(),
        })?;

        Ok(Self {
            workspace_root,
            endpoint: lookup("WEAVERBIRD_ENDPOINT").filter(|e| !e.trim().is_empty()),
            polling: PollingConfig {
                interval: Duration::from_millis(interval_ms),
                max_iterations,
            },
            max_repo_size_bytes,
            retries,
        })
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
