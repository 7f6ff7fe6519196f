//! Metadata probes and conditional streaming fetches with retry logic
//!
//! This module implements the two request shapes the downloader needs: a
//! HEAD metadata probe and a conditional streaming GET. Both are wrapped in
//! a bounded retry policy with exponential backoff. A "not modified" origin
//! response is surfaced as a tagged [`FetchOutcome::CacheValid`] variant
//! rather than an empty body that callers would have to probe by reading.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::FetcherConfig;
use crate::errors::{DownloadResult, TransportError, TransportResult};

use super::config::ClientConfig;

/// Metadata returned by a HEAD probe
#[derive(Debug, Clone)]
pub struct ProbeMetadata {
    /// Entity tag of the current remote content, if the origin supplies one
    pub etag: Option<String>,
    /// Last-Modified header value
    pub last_modified: Option<String>,
    /// Advertised content length in bytes
    pub content_length: Option<u64>,
    /// HTTP status of the probe response
    pub status: u16,
}

/// Outcome of a conditional fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Origin confirmed the supplied etag is still current (HTTP 304);
    /// there is no body to consume
    CacheValid {
        /// The etag that validated, echoed back for record keeping
        etag: Option<String>,
    },
    /// Origin returned fresh content to be streamed
    Body(FetchBody),
}

/// A streaming response body plus the metadata needed to record it
#[derive(Debug)]
pub struct FetchBody {
    /// Entity tag of the content being streamed
    pub etag: Option<String>,
    /// Advertised content length in bytes
    pub content_length: Option<u64>,
    response: Response,
}

impl FetchBody {
    /// Consume the body as a stream of byte chunks
    ///
    /// The underlying connection is released when the stream is dropped,
    /// whether it was fully consumed or abandoned mid-way.
    pub fn into_stream(self) -> BoxStream<'static, DownloadResult<Bytes>> {
        self.response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Request(e).into()))
            .boxed()
    }
}

/// HTTP transport for the price-list origin
///
/// Holds a pooled [`Client`] shared by all concurrent downloads. The client
/// itself is cheap to clone; cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PricingClient {
    client: Client,
    config: Arc<FetcherConfig>,
}

impl PricingClient {
    /// Create a new client from the run configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the underlying HTTP client cannot be built.
    pub fn new(config: Arc<FetcherConfig>) -> TransportResult<Self> {
        let client = ClientConfig::from_fetcher(&config).build_http_client()?;
        Ok(Self { client, config })
    }

    /// URL of the offer index document
    pub fn index_url(&self) -> TransportResult<Url> {
        self.join("index.json")
    }

    /// URL of the current pricing document for a service code
    pub fn service_url(&self, service_code: &str) -> TransportResult<Url> {
        self.join(&format!("{}/current/index.json", service_code))
    }

    fn join(&self, path: &str) -> TransportResult<Url> {
        let raw = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|source| TransportError::InvalidUrl { url: raw, source })
    }

    /// Perform a HEAD request to obtain current remote metadata
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on a terminal HTTP status (>= 400 and not
    /// retryable) or when the retry budget is exhausted.
    pub async fn probe(&self, url: &Url) -> TransportResult<ProbeMetadata> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.client.head(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status >= 400 {
                        match self.handle_error_status(url, response, attempt).await? {
                            RetryStep::Retry => continue,
                            RetryStep::Exhausted(err) => return Err(err),
                        }
                    }

                    let metadata = ProbeMetadata {
                        etag: header_string(&response, ETAG.as_str()),
                        last_modified: header_string(&response, LAST_MODIFIED.as_str()),
                        content_length: header_u64(&response, CONTENT_LENGTH.as_str()),
                        status,
                    };
                    debug!(
                        url = %url,
                        status,
                        etag = ?metadata.etag,
                        "Probe successful"
                    );
                    return Ok(metadata);
                }
                Err(e) => match self.handle_request_error(url, e, attempt).await? {
                    RetryStep::Retry => continue,
                    RetryStep::Exhausted(err) => return Err(err),
                },
            }
        }
    }

    /// Perform a conditional GET, streaming the body in chunks
    ///
    /// When `etag` is supplied it is attached as an `If-None-Match`
    /// precondition; an origin "304 Not Modified" reply produces
    /// [`FetchOutcome::CacheValid`] without a body.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on a terminal HTTP status or when the retry
    /// budget is exhausted. Errors while consuming the returned stream are
    /// not retried.
    pub async fn fetch(&self, url: &Url, etag: Option<&str>) -> TransportResult<FetchOutcome> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut request = self.client.get(url.clone());
            if let Some(tag) = etag {
                request = request.header(IF_NONE_MATCH, tag);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status() == StatusCode::NOT_MODIFIED {
                        debug!(url = %url, "Cache valid - not modified");
                        return Ok(FetchOutcome::CacheValid {
                            etag: etag.map(str::to_string),
                        });
                    }

                    let status = response.status().as_u16();
                    if status >= 400 {
                        match self.handle_error_status(url, response, attempt).await? {
                            RetryStep::Retry => continue,
                            RetryStep::Exhausted(err) => return Err(err),
                        }
                    }

                    let body = FetchBody {
                        etag: header_string(&response, ETAG.as_str()),
                        content_length: header_u64(&response, CONTENT_LENGTH.as_str()),
                        response,
                    };
                    debug!(
                        url = %url,
                        status,
                        content_length = ?body.content_length,
                        "Streaming fetch started"
                    );
                    return Ok(FetchOutcome::Body(body));
                }
                Err(e) => match self.handle_request_error(url, e, attempt).await? {
                    RetryStep::Retry => continue,
                    RetryStep::Exhausted(err) => return Err(err),
                },
            }
        }
    }

    /// Decide how to proceed after an HTTP error status
    ///
    /// Non-retryable statuses fail immediately without consuming a retry
    /// attempt; retryable statuses back off until the budget is exhausted.
    async fn handle_error_status(
        &self,
        url: &Url,
        response: Response,
        attempt: u32,
    ) -> TransportResult<RetryStep> {
        let status = response.status().as_u16();

        if !self.config.is_retryable_status(status) {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status,
                url: url.to_string(),
                body,
            });
        }

        if attempt < self.config.max_retries {
            let delay = self.backoff_delay(attempt);
            warn!(
                url = %url,
                status,
                attempt,
                max_retries = self.config.max_retries,
                "Retryable status, backing off for {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
            return Ok(RetryStep::Retry);
        }

        let body = response.text().await.unwrap_or_default();
        Ok(RetryStep::Exhausted(TransportError::RetriesExhausted {
            attempts: attempt,
            url: url.to_string(),
            source: Box::new(TransportError::Status {
                status,
                url: url.to_string(),
                body,
            }),
        }))
    }

    /// Decide how to proceed after a connection or timeout failure
    async fn handle_request_error(
        &self,
        url: &Url,
        error: reqwest::Error,
        attempt: u32,
    ) -> TransportResult<RetryStep> {
        if attempt < self.config.max_retries {
            let delay = self.backoff_delay(attempt);
            warn!(
                url = %url,
                attempt,
                max_retries = self.config.max_retries,
                "Request failed: {}. Retrying in {:?}",
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            return Ok(RetryStep::Retry);
        }

        Ok(RetryStep::Exhausted(TransportError::RetriesExhausted {
            attempts: attempt,
            url: url.to_string(),
            source: Box::new(TransportError::Request(error)),
        }))
    }

    /// Exponential backoff delay for the given attempt number, clamped to
    /// the configured floor and ceiling
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .retry_min_wait
            .saturating_mul(factor)
            .min(self.config.retry_max_wait)
    }
}

/// Next step after a failed attempt
enum RetryStep {
    Retry,
    Exhausted(TransportError),
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
