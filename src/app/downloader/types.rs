//! Data structures for per-key outcomes and batch results

use std::path::PathBuf;

/// Result of one completed per-key download protocol
#[derive(Debug, Clone)]
pub struct KeyReport {
    /// Final artifact path
    pub path: PathBuf,
    /// Bytes attributed to the outcome (transfer size, or existing
    /// artifact size on a cache hit)
    pub size_bytes: u64,
    /// Whether the outcome was a cache hit
    pub cache_hit: bool,
}

/// Terminal outcome of one key within a batch
#[derive(Debug)]
pub enum KeyOutcome {
    /// Protocol completed and the artifact is in place
    Success {
        service_code: String,
        report: KeyReport,
    },
    /// Protocol failed; siblings are unaffected
    Failed { service_code: String, error: String },
    /// Shutdown was observed before or during the protocol
    Cancelled { service_code: String },
}

/// Aggregated result of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Keys that completed successfully, including cache hits
    pub succeeded: Vec<String>,
    /// Keys that failed, with error text
    pub failed: Vec<(String, String)>,
    /// Number of cache-hit outcomes among the successes
    pub cache_hits: usize,
    /// Total bytes attributed to successful outcomes
    pub total_bytes: u64,
    /// Keys skipped or unwound because shutdown was requested
    pub cancelled: Vec<String>,
    /// Whether the run was cut short by a shutdown request
    pub was_cancelled: bool,
}

impl BatchSummary {
    /// Fold one key outcome into the summary
    pub fn absorb(&mut self, outcome: KeyOutcome) {
        match outcome {
            KeyOutcome::Success {
                service_code,
                report,
            } => {
                if report.cache_hit {
                    self.cache_hits += 1;
                }
                self.total_bytes += report.size_bytes;
                self.succeeded.push(service_code);
            }
            KeyOutcome::Failed {
                service_code,
                error,
            } => self.failed.push((service_code, error)),
            KeyOutcome::Cancelled { service_code } => self.cancelled.push(service_code),
        }
    }

    /// Total number of keys the batch attempted to cover
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }

    /// Whether every key succeeded
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty() && !self.was_cancelled
    }
}
