//! SHA-256 integrity verification for downloaded artifacts
//!
//! Each artifact gets a sidecar record `{sha256, etag}` stored next to it.
//! The record decides whether a fresh fetch is needed: the etag comparison
//! protects against remote staleness, the hash comparison against local
//! corruption or partial writes. The hash alone never substitutes for an
//! etag comparison when a remote etag is obtainable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::FetcherConfig;
use crate::constants::files;
use crate::errors::{IntegrityError, IntegrityResult};

/// Persisted sidecar record establishing trust in a stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityRecord {
    /// Hex-encoded SHA-256 of the artifact bytes
    pub sha256: String,
    /// Entity tag of the origin content the artifact was fetched from
    pub etag: Option<String>,
}

/// Why a fetch is required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// No artifact exists on disk
    MissingArtifact,
    /// Artifact exists but has no sidecar record
    MissingRecord,
    /// A remote etag is known but the record stores none
    MissingStoredEtag,
    /// Stored etag differs from the current remote etag
    EtagChanged,
    /// Recomputed hash does not match the record (local corruption)
    HashMismatch,
}

/// Three-way fetch decision consumed by the download protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Local artifact is trustworthy; no transfer needed
    Skip,
    /// A fresh fetch is required
    Fetch(FetchReason),
}

/// Maintains sidecar records and decides when a fetch is necessary
#[derive(Debug, Clone)]
pub struct IntegrityStore {
    output_dir: PathBuf,
    block_size: usize,
}

impl IntegrityStore {
    /// Create a store rooted at the configured output directory
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            block_size: config.chunk_size,
        }
    }

    /// Path of the artifact file for a key
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", key, files::ARTIFACT_EXTENSION))
    }

    /// Path of the sidecar record for a key
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", key, files::SIDECAR_EXTENSION))
    }

    /// Compute the hex-encoded SHA-256 of a file, streaming it in
    /// fixed-size blocks so memory stays independent of file size
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::Io` if the file cannot be read.
    pub async fn hash_file(&self, path: &Path) -> IntegrityResult<String> {
        let mut file = File::open(path).await.map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.block_size];
        loop {
            let n = file.read(&mut buf).await.map_err(|source| IntegrityError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Load the sidecar record for a key, if one exists
    ///
    /// A corrupt record is treated as missing (forcing a re-fetch) rather
    /// than failing the run; the condition is logged.
    pub async fn load_record(&self, key: &str) -> Option<IntegrityRecord> {
        let path = self.record_path(key);
        let content = tokio::fs::read(&path).await.ok()?;

        match serde_json::from_slice(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, path = %path.display(), "Corrupt integrity record: {}", e);
                None
            }
        }
    }

    /// Persist a sidecar record, overwriting any prior one
    ///
    /// The record is synced to disk before this returns.
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::Io` on any write failure.
    pub async fn save_record(
        &self,
        key: &str,
        sha256: String,
        etag: Option<String>,
    ) -> IntegrityResult<()> {
        let path = self.record_path(key);
        let record = IntegrityRecord { sha256, etag };
        let content = serde_json::to_vec_pretty(&record).expect("record serialization is infallible");

        let mut file = File::create(&path).await.map_err(|source| IntegrityError::Io {
            path: path.clone(),
            source,
        })?;
        file.write_all(&content).await.map_err(|source| IntegrityError::Io {
            path: path.clone(),
            source,
        })?;
        file.sync_all().await.map_err(|source| IntegrityError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(key, sha256 = %record.sha256, etag = ?record.etag, "Saved integrity record");
        Ok(())
    }

    /// Stored etag usable as an `If-None-Match` token for a conditional
    /// fetch
    ///
    /// Returns the record's etag only when the artifact re-hashes to the
    /// record, so that a "not modified" reply can safely keep the local
    /// content. Anything less trustworthy yields `None` and forces an
    /// unconditional fetch.
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::Io` if the artifact cannot be read.
    pub async fn validated_etag(&self, key: &str) -> IntegrityResult<Option<String>> {
        let Some(record) = self.load_record(key).await else {
            return Ok(None);
        };
        let Some(etag) = record.etag else {
            return Ok(None);
        };

        let artifact = self.artifact_path(key);
        if !artifact.exists() {
            return Ok(None);
        }

        let actual = self.hash_file(&artifact).await?;
        if actual == record.sha256 {
            Ok(Some(etag))
        } else {
            Ok(None)
        }
    }

    /// Verify a stored artifact against its sidecar record
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::RecordMissing` if there is no record,
    /// `IntegrityError::HashMismatch` if the recomputed hash differs, and
    /// `IntegrityError::Io` on read failure.
    pub async fn verify(&self, key: &str) -> IntegrityResult<()> {
        let record = self
            .load_record(key)
            .await
            .ok_or_else(|| IntegrityError::RecordMissing {
                key: key.to_string(),
            })?;

        let actual = self.hash_file(&self.artifact_path(key)).await?;
        if actual != record.sha256 {
            return Err(IntegrityError::HashMismatch {
                key: key.to_string(),
                expected: record.sha256,
                actual,
            });
        }

        debug!(key, "Artifact integrity verified");
        Ok(())
    }

    /// Decide whether a fetch is needed for a key given the current remote
    /// etag (if one could be obtained)
    ///
    /// Returns [`FetchDecision::Skip`] only when the artifact exists, a
    /// record exists, the etags are consistent, and the recomputed hash
    /// matches the record.
    ///
    /// # Errors
    ///
    /// I/O failures while hashing surface as `IntegrityError`; they are
    /// never silently treated as "needs fetch".
    pub async fn should_fetch(
        &self,
        key: &str,
        remote_etag: Option<&str>,
    ) -> IntegrityResult<FetchDecision> {
        let artifact = self.artifact_path(key);
        if !artifact.exists() {
            return Ok(FetchDecision::Fetch(FetchReason::MissingArtifact));
        }

        let Some(record) = self.load_record(key).await else {
            return Ok(FetchDecision::Fetch(FetchReason::MissingRecord));
        };

        if let Some(remote) = remote_etag {
            match record.etag.as_deref() {
                // No stored etag to compare against: conservative re-fetch
                None => return Ok(FetchDecision::Fetch(FetchReason::MissingStoredEtag)),
                Some(stored) if stored != remote => {
                    info!(key, stored, remote, "Etag changed, fetch required");
                    return Ok(FetchDecision::Fetch(FetchReason::EtagChanged));
                }
                Some(_) => {}
            }
        }

        let actual = self.hash_file(&artifact).await?;
        if actual != record.sha256 {
            warn!(
                key,
                expected = %record.sha256,
                actual = %actual,
                "Local corruption detected, fetch required"
            );
            return Ok(FetchDecision::Fetch(FetchReason::HashMismatch));
        }

        Ok(FetchDecision::Skip)
    }
}
