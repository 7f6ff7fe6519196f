//! Application constants for Pricing Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// AWS price-list origin endpoints
pub mod pricing {
    /// Base URL for the public price-list API
    pub const BASE_URL: &str = "https://pricing.us-east-1.amazonaws.com/offers/v1.0/aws";

    /// Sentinel key under which the offer index is stored
    pub const INDEX_KEY: &str = "index";

    /// Top-level field of the offer index that enumerates service codes
    pub const INDEX_OFFERS_FIELD: &str = "offers";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Pricing-Fetcher/0.2.0 (Price Data Tool)";

    /// Total request timeout (large pricing files take a while)
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 30;

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
}

/// Retry and backoff configuration
pub mod limits {
    use super::Duration;

    /// Maximum attempts for a single request, including the first
    pub const MAX_RETRIES: u32 = 5;

    /// Minimum wait between retry attempts
    pub const RETRY_MIN_WAIT: Duration = Duration::from_secs(2);

    /// Maximum wait between retry attempts
    pub const RETRY_MAX_WAIT: Duration = Duration::from_secs(120);

    /// HTTP status codes that warrant a retry
    pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = "tmp";

    /// Extension for stored artifacts
    pub const ARTIFACT_EXTENSION: &str = "json";

    /// Extension for integrity sidecar records
    pub const SIDECAR_EXTENSION: &str = "sha256";

    /// Default chunk size for streaming and hashing (64 KB)
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    /// Minimum permitted chunk size (8 KB)
    pub const MIN_CHUNK_SIZE: usize = 8 * 1024;
}

/// Concurrency configuration
pub mod workers {
    /// Default number of concurrent in-flight downloads
    pub const DEFAULT_MAX_CONCURRENT: usize = 50;

    /// Hard ceiling on concurrent downloads
    pub const MAX_CONCURRENT_LIMIT: usize = 100;
}

/// Metrics export constants
pub mod metrics {
    /// File name of the exported metrics document
    pub const EXPORT_FILE_NAME: &str = "latest.json";
}

// Re-export commonly used constants for convenience
pub use files::{ARTIFACT_EXTENSION, SIDECAR_EXTENSION, TEMP_FILE_SUFFIX};
pub use http::USER_AGENT;
pub use limits::{MAX_RETRIES, RETRYABLE_STATUS_CODES};
pub use pricing::{BASE_URL, INDEX_KEY};
pub use workers::DEFAULT_MAX_CONCURRENT;
