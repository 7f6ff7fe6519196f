//! Error types for Pricing Fetcher
//!
//! This module defines error types for all components of the application.
//! Errors are designed to be actionable and provide clear context for
//! debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// HTTP transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Origin returned a terminal (non-retryable) HTTP status
    #[error("HTTP {status} error for {url}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection, DNS, or timeout failure from the HTTP stack
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    /// URL could not be constructed
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Retry budget exhausted; carries the last error observed
    #[error("Maximum retry attempts ({attempts}) exceeded for {url}")]
    RetriesExhausted {
        attempts: u32,
        url: String,
        #[source]
        source: Box<TransportError>,
    },
}

impl TransportError {
    /// HTTP status code associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request(e) => e.status().map(|s| s.as_u16()),
            TransportError::RetriesExhausted { source, .. } => source.status(),
            TransportError::InvalidUrl { .. } => None,
        }
    }
}

/// Integrity verification errors
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// Recomputed hash does not match the persisted record
    #[error("Hash mismatch for {key}. Expected: {expected}, got: {actual}")]
    HashMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// No sidecar record exists for the key
    #[error("No integrity record found for {key}")]
    RecordMissing { key: String },

    /// I/O failure while hashing or persisting a record
    #[error("Integrity I/O failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Output directory could not be created or accessed
    #[error("Storage directory not accessible: {path}")]
    DirectoryNotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Write to a temporary file failed
    #[error("Failed to write artifact for {key}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Atomic rename from temp path to final path failed
    #[error("Atomic rename failed: {temp_path} -> {final_path}")]
    AtomicRename {
        temp_path: PathBuf,
        final_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic filesystem failure
    #[error("Filesystem operation failed at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid TOML in a configuration file
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// A field failed range or sanity validation
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading a configuration file
    #[error("I/O error reading configuration")]
    Io(#[from] std::io::Error),
}

/// Per-download errors covering the whole fetch protocol for one key
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Integrity verification failure
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Offer index was fetched but could not be interpreted
    #[error("Failed to parse offer index: {reason}")]
    IndexFormat { reason: String },

    /// Shutdown signal observed while the download was in flight
    #[error("Download cancelled")]
    Cancelled,
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Integrity error
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Whether this error represents a user-requested cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Download(DownloadError::Cancelled))
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport",
            AppError::Integrity(_) => "integrity",
            AppError::Storage(_) => "storage",
            AppError::Download(_) => "download",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Integrity result type alias
pub type IntegrityResult<T> = std::result::Result<T, IntegrityError>;

/// Storage result type alias
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
