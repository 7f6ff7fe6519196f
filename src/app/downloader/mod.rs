//! Download orchestration for the offer index and per-service artifacts
//!
//! Drives the per-key protocol — probe, decide, stream, persist, verify,
//! record — and fans it out across many service codes under a semaphore
//! admission gate. A single key's failure is caught at the key boundary and
//! converted into a failure record; it never aborts sibling keys. Only an
//! index-level failure is fatal to the whole batch, because no key set can
//! be derived without it.
//!
//! # Module Organization
//!
//! - [`signals`] - Shutdown token and OS signal wiring
//! - [`types`] - Per-key outcomes and batch summaries

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::app::client::{FetchOutcome, PricingClient};
use crate::app::integrity::{FetchDecision, FetchReason, IntegrityStore};
use crate::app::metrics::MetricsSink;
use crate::app::storage::ArtifactStore;
use crate::config::FetcherConfig;
use crate::constants::pricing;
use crate::errors::{DownloadError, DownloadResult, Result, StorageError};

pub mod signals;
pub mod types;

#[cfg(test)]
mod tests;

pub use signals::{ShutdownToken, SignalHandler};
pub use types::{BatchSummary, KeyOutcome, KeyReport};

/// Orchestrates conditional, verified downloads for one run
///
/// Cloning is cheap and shares the connection pool, the metrics sink, and
/// the shutdown token; the batch fan-out clones one instance per task.
#[derive(Debug, Clone)]
pub struct Downloader {
    config: Arc<FetcherConfig>,
    client: PricingClient,
    integrity: IntegrityStore,
    storage: ArtifactStore,
    metrics: Arc<Mutex<MetricsSink>>,
    shutdown: ShutdownToken,
}

impl Downloader {
    /// Create a downloader from a validated configuration and a shutdown
    /// token shared with the process signal handler
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the HTTP client
    /// cannot be built, or the output directory cannot be created.
    pub async fn new(config: FetcherConfig, shutdown: ShutdownToken) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let client = PricingClient::new(Arc::clone(&config))?;
        let storage = ArtifactStore::new(&config).await?;
        let integrity = IntegrityStore::new(&config);
        let metrics = Arc::new(Mutex::new(MetricsSink::new(config.metrics_dir.clone())));

        info!(
            base_url = %config.base_url,
            output_dir = %config.output_dir.display(),
            max_concurrent = config.max_concurrent_downloads,
            "Downloader initialized"
        );

        Ok(Self {
            config,
            client,
            integrity,
            storage,
            metrics,
            shutdown,
        })
    }

    /// Shared metrics sink for this run
    pub fn metrics(&self) -> Arc<Mutex<MetricsSink>> {
        Arc::clone(&self.metrics)
    }

    /// Run configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch the offer index document
    ///
    /// # Errors
    ///
    /// Index failures are fatal to any batch built on top of them.
    pub async fn fetch_index(&self) -> DownloadResult<PathBuf> {
        let url = self.client.index_url()?;
        let report = self.fetch_one(pricing::INDEX_KEY, &url).await?;
        Ok(report.path)
    }

    /// Fetch pricing for a single service code
    pub async fn fetch_service(&self, service_code: &str) -> DownloadResult<PathBuf> {
        let url = self.client.service_url(service_code)?;
        let report = self.fetch_one(service_code, &url).await?;
        Ok(report.path)
    }

    /// Run the full per-key protocol for one key, recording the outcome
    ///
    /// Cancellation is not recorded as a failure; every other terminal
    /// outcome produces exactly one metrics record.
    pub async fn fetch_one(&self, key: &str, url: &url::Url) -> DownloadResult<KeyReport> {
        let start = Instant::now();
        let result = self.run_protocol(key, url).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut metrics = self.metrics.lock().await;
        match &result {
            Ok(report) => {
                metrics.record(
                    key,
                    true,
                    duration_ms,
                    report.size_bytes,
                    report.cache_hit,
                    None,
                );
            }
            Err(DownloadError::Cancelled) => {}
            Err(e) => {
                metrics.record(key, false, duration_ms, 0, false, Some(e.to_string()));
            }
        }

        result
    }

    /// The per-key protocol: PROBE, DECIDE, (SKIP | STREAM), PERSIST,
    /// VERIFY
    async fn run_protocol(&self, key: &str, url: &url::Url) -> DownloadResult<KeyReport> {
        self.checkpoint()?;

        // PROBE: a missing etag only disables token-based skip decisions
        let probe = self.client.probe(url).await?;
        let remote_etag = probe.etag;

        // DECIDE. The conditional token for the fetch is the STORED etag,
        // never the probe's: a 304 reply keeps the local artifact, which is
        // only safe when that artifact re-hashes clean against its record.
        let mut conditional_etag = None;
        if self.config.verify_integrity {
            match self
                .integrity
                .should_fetch(key, remote_etag.as_deref())
                .await?
            {
                FetchDecision::Skip => return self.cache_hit_report(key).await,
                FetchDecision::Fetch(reason) => {
                    debug!(key, ?reason, "Fetch required");
                    if reason == FetchReason::EtagChanged {
                        conditional_etag = self.integrity.validated_etag(key).await?;
                    }
                }
            }
        }

        self.checkpoint()?;

        // STREAM: the origin may still report "not modified" if the etag
        // reverted between the probe and the fetch
        let outcome = self.client.fetch(url, conditional_etag.as_deref()).await?;
        let body = match outcome {
            FetchOutcome::CacheValid { .. } => return self.cache_hit_report(key).await,
            FetchOutcome::Body(body) => body,
        };
        let body_etag = body.etag.clone();

        // PERSIST: chunk boundaries double as cancellation checkpoints
        let token = self.shutdown.clone();
        let stream = body.into_stream().map(move |chunk| {
            if token.is_cancelled() {
                Err(DownloadError::Cancelled)
            } else {
                chunk
            }
        });
        let (path, size_bytes) = self.storage.save_stream(key, stream).await?;

        // VERIFY
        if self.config.verify_integrity {
            let digest = self.integrity.hash_file(&path).await?;
            self.integrity.save_record(key, digest, body_etag).await?;
        }

        info!(key, size_bytes, "Download complete");
        Ok(KeyReport {
            path,
            size_bytes,
            cache_hit: false,
        })
    }

    /// Terminal cache-hit outcome using the existing artifact's size
    async fn cache_hit_report(&self, key: &str) -> DownloadResult<KeyReport> {
        let path = self.storage.artifact_path(key);
        let size_bytes = self.storage.artifact_size(key).await.unwrap_or(0);
        info!(key, size_bytes, "Using cached artifact");
        Ok(KeyReport {
            path,
            size_bytes,
            cache_hit: true,
        })
    }

    fn checkpoint(&self) -> DownloadResult<()> {
        if self.shutdown.is_cancelled() {
            Err(DownloadError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Extract the service code set from offer index content
    ///
    /// An absent or non-object `offers` field yields an empty set rather
    /// than an error, tolerating an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::IndexFormat` only when the document itself
    /// is not valid JSON.
    pub fn parse_index(content: &[u8]) -> DownloadResult<Vec<String>> {
        let value: serde_json::Value =
            serde_json::from_slice(content).map_err(|e| DownloadError::IndexFormat {
                reason: e.to_string(),
            })?;

        let codes = value
            .get(pricing::INDEX_OFFERS_FIELD)
            .and_then(|offers| offers.as_object())
            .map(|offers| offers.keys().cloned().collect())
            .unwrap_or_default();

        Ok(codes)
    }

    /// Fetch the offer index and derive the service code set from it
    pub async fn discover_service_codes(&self) -> DownloadResult<Vec<String>> {
        let index_path = self.fetch_index().await?;
        let content = tokio::fs::read(&index_path)
            .await
            .map_err(|source| StorageError::Io {
                path: index_path.clone(),
                source,
            })?;

        let codes = Self::parse_index(&content)?;
        info!(service_count = codes.len(), "Parsed offer index");
        Ok(codes)
    }

    /// Download many services concurrently under the admission gate
    ///
    /// When `service_codes` is `None` the set is discovered from the offer
    /// index; an index failure is fatal. Per-key failures are absorbed into
    /// the summary and never abort siblings. A shutdown request surfaces as
    /// `was_cancelled` on the summary, distinct from ordinary failures.
    pub async fn fetch_all(&self, service_codes: Option<Vec<String>>) -> Result<BatchSummary> {
        let codes = match service_codes {
            Some(codes) => codes,
            None => self.discover_service_codes().await?,
        };

        info!(total_services = codes.len(), "Starting batch download");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads));
        let mut handles = Vec::with_capacity(codes.len());

        for code in codes {
            let downloader = self.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("admission gate is never closed");

                if downloader.shutdown.is_cancelled() {
                    return KeyOutcome::Cancelled { service_code: code };
                }

                let url = match downloader.client.service_url(&code) {
                    Ok(url) => url,
                    Err(e) => {
                        return KeyOutcome::Failed {
                            service_code: code,
                            error: e.to_string(),
                        }
                    }
                };

                match downloader.fetch_one(&code, &url).await {
                    Ok(report) => KeyOutcome::Success {
                        service_code: code,
                        report,
                    },
                    Err(DownloadError::Cancelled) => KeyOutcome::Cancelled { service_code: code },
                    Err(e) => {
                        error!(service_code = %code, "Download failed: {}", e);
                        KeyOutcome::Failed {
                            service_code: code,
                            error: e.to_string(),
                        }
                    }
                }
            }));
        }

        let mut summary = BatchSummary::default();
        for handle in handles {
            match handle.await {
                Ok(outcome) => summary.absorb(outcome),
                Err(e) => error!("Download task panicked: {}", e),
            }
        }
        summary.was_cancelled = self.shutdown.is_cancelled();

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            cache_hits = summary.cache_hits,
            total_bytes = summary.total_bytes,
            cancelled = summary.was_cancelled,
            "Batch download finished"
        );

        Ok(summary)
    }

    /// Export metrics, logging rather than propagating failure
    ///
    /// A metrics problem must never mask the outcome of the downloads
    /// themselves.
    pub async fn export_metrics(&self) -> Option<PathBuf> {
        match self.metrics.lock().await.export().await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to export metrics: {}", e);
                None
            }
        }
    }
}
