//! Per-download metrics collection and export
//!
//! One record is appended per attempted key; running counters are updated
//! in O(1). Aggregate statistics are always derived freshly from the
//! counters when a snapshot is taken, never accumulated incrementally, so
//! they cannot drift from the record sequence.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::constants::metrics;
use crate::errors::{StorageError, StorageResult};

/// Outcome record for a single download attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Service code (or the index sentinel) this attempt was for
    pub service_code: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Wall-clock duration of the whole protocol in milliseconds
    pub duration_ms: u64,
    /// Bytes of artifact content attributed to this attempt
    pub size_bytes: u64,
    /// Whether the outcome was a cache hit (no content transfer)
    pub cache_hit: bool,
    /// Error text for failed attempts
    pub error: Option<String>,
    /// RFC 3339 timestamp of when the record was created
    pub timestamp: String,
}

/// Aggregate statistics derived from the record sequence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_downloads: u64,
    pub successful_downloads: u64,
    pub failed_downloads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_bytes_downloaded: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub start_time: String,
    pub end_time: Option<String>,
}

/// Serialized shape of the exported metrics document
#[derive(Debug, Serialize, Deserialize)]
struct MetricsExport {
    aggregate: AggregateStats,
    downloads: Vec<DownloadRecord>,
}

/// Collects per-download outcomes for one run
#[derive(Debug)]
pub struct MetricsSink {
    metrics_dir: PathBuf,
    records: Vec<DownloadRecord>,
    totals: Totals,
    start_time: String,
}

#[derive(Debug, Default)]
struct Totals {
    downloads: u64,
    successes: u64,
    failures: u64,
    cache_hits: u64,
    bytes: u64,
    duration_ms: u64,
}

impl MetricsSink {
    /// Create a sink that will export under the given directory
    pub fn new(metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            metrics_dir: metrics_dir.into(),
            records: Vec::new(),
            totals: Totals::default(),
            start_time: now_rfc3339(),
        }
    }

    /// Append one outcome record and update the running counters
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        service_code: &str,
        success: bool,
        duration_ms: u64,
        size_bytes: u64,
        cache_hit: bool,
        error: Option<String>,
    ) {
        self.totals.downloads += 1;
        if success {
            self.totals.successes += 1;
        } else {
            self.totals.failures += 1;
        }
        if cache_hit {
            self.totals.cache_hits += 1;
        }
        self.totals.bytes += size_bytes;
        self.totals.duration_ms += duration_ms;

        debug!(
            service_code,
            success, duration_ms, size_bytes, cache_hit, "Recorded download outcome"
        );

        self.records.push(DownloadRecord {
            service_code: service_code.to_string(),
            success,
            duration_ms,
            size_bytes,
            cache_hit,
            error,
            timestamp: now_rfc3339(),
        });
    }

    /// Records accumulated so far, in completion order
    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    /// Derive a fresh aggregate snapshot from the counters
    pub fn snapshot(&self) -> AggregateStats {
        let total = self.totals.downloads;
        let ratio = |part: u64| {
            if total == 0 {
                0.0
            } else {
                part as f64 / total as f64
            }
        };

        AggregateStats {
            total_downloads: total,
            successful_downloads: self.totals.successes,
            failed_downloads: self.totals.failures,
            cache_hits: self.totals.cache_hits,
            cache_misses: total - self.totals.cache_hits,
            total_bytes_downloaded: self.totals.bytes,
            total_duration_ms: self.totals.duration_ms,
            average_duration_ms: if total == 0 {
                0.0
            } else {
                self.totals.duration_ms as f64 / total as f64
            },
            success_rate: ratio(self.totals.successes),
            cache_hit_rate: ratio(self.totals.cache_hits),
            start_time: self.start_time.clone(),
            end_time: Some(now_rfc3339()),
        }
    }

    /// Export all records plus the current snapshot as a JSON document
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on any write failure. Callers treat this as
    /// non-fatal so a metrics problem never masks the download outcome.
    pub async fn export(&self) -> StorageResult<PathBuf> {
        let export = MetricsExport {
            aggregate: self.snapshot(),
            downloads: self.records.clone(),
        };
        let content = serde_json::to_vec_pretty(&export)
            .expect("metrics serialization is infallible");

        tokio::fs::create_dir_all(&self.metrics_dir)
            .await
            .map_err(|source| StorageError::DirectoryNotAccessible {
                path: self.metrics_dir.clone(),
                source,
            })?;

        let path = self.metrics_dir.join(metrics::EXPORT_FILE_NAME);
        write_file(&path, &content).await?;

        info!(
            path = %path.display(),
            total_downloads = export.aggregate.total_downloads,
            "Metrics exported"
        );
        Ok(path)
    }
}

async fn write_file(path: &Path, content: &[u8]) -> StorageResult<()> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    file.write_all(content)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    file.flush().await.map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
