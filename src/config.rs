//! Configuration management for Pricing Fetcher
//!
//! Provides a single validated configuration struct constructed once per run
//! and shared by reference with every component. Supports zero-config
//! defaults, TOML file loading, and CLI overrides layered on top.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{files, http, limits, pricing, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Runtime configuration for the downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Base URL of the price-list origin
    pub base_url: String,

    /// Directory for downloaded artifacts and integrity sidecars
    pub output_dir: PathBuf,

    /// Directory for the exported metrics document
    pub metrics_dir: PathBuf,

    /// Maximum number of concurrent in-flight downloads (1-100)
    pub max_concurrent_downloads: usize,

    /// Chunk size for streaming writes and hashing (bytes)
    pub chunk_size: usize,

    /// Connection establishment timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Total per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum attempts per request, including the first
    pub max_retries: u32,

    /// Minimum wait between retry attempts
    #[serde(with = "humantime_serde")]
    pub retry_min_wait: Duration,

    /// Maximum wait between retry attempts
    #[serde(with = "humantime_serde")]
    pub retry_max_wait: Duration,

    /// HTTP status codes that warrant a retry
    pub retryable_status_codes: BTreeSet<u16>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Enable SHA-256 integrity verification and sidecar records
    pub verify_integrity: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: pricing::BASE_URL.to_string(),
            output_dir: PathBuf::from("data/pricing"),
            metrics_dir: PathBuf::from("metrics"),
            max_concurrent_downloads: workers::DEFAULT_MAX_CONCURRENT,
            chunk_size: files::DEFAULT_CHUNK_SIZE,
            connect_timeout: http::CONNECT_TIMEOUT,
            request_timeout: http::REQUEST_TIMEOUT,
            max_retries: limits::MAX_RETRIES,
            retry_min_wait: limits::RETRY_MIN_WAIT,
            retry_max_wait: limits::RETRY_MAX_WAIT,
            retryable_status_codes: limits::RETRYABLE_STATUS_CODES.into_iter().collect(),
            user_agent: http::USER_AGENT.to_string(),
            verify_integrity: true,
        }
    }
}

impl FetcherConfig {
    /// Load configuration from a TOML file and validate it
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, malformed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate all fields against their permitted ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_url.is_empty() {
            return Err(Self::invalid("base_url", &self.base_url, "must not be empty"));
        }

        if self.max_concurrent_downloads == 0
            || self.max_concurrent_downloads > workers::MAX_CONCURRENT_LIMIT
        {
            return Err(Self::invalid(
                "max_concurrent_downloads",
                &self.max_concurrent_downloads.to_string(),
                &format!("must be between 1 and {}", workers::MAX_CONCURRENT_LIMIT),
            ));
        }

        if self.chunk_size < files::MIN_CHUNK_SIZE {
            return Err(Self::invalid(
                "chunk_size",
                &self.chunk_size.to_string(),
                &format!("must be at least {} bytes", files::MIN_CHUNK_SIZE),
            ));
        }

        if self.max_retries == 0 || self.max_retries > 10 {
            return Err(Self::invalid(
                "max_retries",
                &self.max_retries.to_string(),
                "must be between 1 and 10",
            ));
        }

        if self.retry_min_wait > self.retry_max_wait {
            return Err(Self::invalid(
                "retry_min_wait",
                &format!("{:?}", self.retry_min_wait),
                "must not exceed retry_max_wait",
            ));
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Self::invalid(
                "connect_timeout/request_timeout",
                "0s",
                "timeouts must be non-zero",
            ));
        }

        Ok(())
    }

    /// Whether the given HTTP status code should be retried
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
