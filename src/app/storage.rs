//! Artifact storage with atomic writes and streaming
//!
//! Streamed content is written to a temporary sibling path and atomically
//! renamed into place on success, so a concurrent reader never observes a
//! half-written artifact. On failure the temporary file is removed
//! best-effort and the destination is left untouched.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::FetcherConfig;
use crate::constants::files;
use crate::errors::{DownloadResult, StorageError, StorageResult};

/// Durable, atomically-replaced storage for downloaded artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Create the store, ensuring the output directory exists
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DirectoryNotAccessible` if the directory
    /// cannot be created.
    pub async fn new(config: &FetcherConfig) -> StorageResult<Self> {
        fs::create_dir_all(&config.output_dir).await.map_err(|source| {
            error!(
                "Failed to create output directory {}: {}",
                config.output_dir.display(),
                source
            );
            StorageError::DirectoryNotAccessible {
                path: config.output_dir.clone(),
                source,
            }
        })?;

        debug!("Storage directory ready: {}", config.output_dir.display());
        Ok(Self {
            output_dir: config.output_dir.clone(),
        })
    }

    /// Path of the stored artifact for a key
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", key, files::ARTIFACT_EXTENSION))
    }

    /// Size in bytes of the stored artifact, or `None` if absent
    pub async fn artifact_size(&self, key: &str) -> Option<u64> {
        fs::metadata(self.artifact_path(key)).await.ok().map(|m| m.len())
    }

    /// Whether an artifact exists for the key
    pub fn exists(&self, key: &str) -> bool {
        self.artifact_path(key).exists()
    }

    /// Consume a byte stream into the artifact for `key`, returning the
    /// final path and the total bytes written
    ///
    /// The destination becomes visible only after the full stream has been
    /// consumed, flushed, and synced; the replace is a single atomic rename.
    ///
    /// # Errors
    ///
    /// Propagates the original stream error or a `StorageError` on write
    /// failure. In both cases the temporary file is removed best-effort
    /// and the destination keeps its previous state.
    pub async fn save_stream<S>(&self, key: &str, mut stream: S) -> DownloadResult<(PathBuf, u64)>
    where
        S: Stream<Item = DownloadResult<Bytes>> + Unpin,
    {
        let final_path = self.artifact_path(key);
        let temp_path = temp_path_for(&final_path);

        match self.write_stream(key, &temp_path, &mut stream).await {
            Ok(total_bytes) => {
                fs::rename(&temp_path, &final_path).await.map_err(|source| {
                    StorageError::AtomicRename {
                        temp_path: temp_path.clone(),
                        final_path: final_path.clone(),
                        source,
                    }
                })?;

                info!(
                    key,
                    path = %final_path.display(),
                    size_bytes = total_bytes,
                    "Artifact saved"
                );
                Ok((final_path, total_bytes))
            }
            Err(e) => {
                if temp_path.exists() {
                    let _ = fs::remove_file(&temp_path).await;
                }
                Err(e)
            }
        }
    }

    /// Write all chunks of the stream to the temporary path
    async fn write_stream<S>(
        &self,
        key: &str,
        temp_path: &Path,
        stream: &mut S,
    ) -> DownloadResult<u64>
    where
        S: Stream<Item = DownloadResult<Bytes>> + Unpin,
    {
        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };

        let mut file = File::create(temp_path).await.map_err(write_err)?;
        let mut total_bytes: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|source| StorageError::Write {
                    key: key.to_string(),
                    source,
                })?;
            total_bytes += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;
        file.sync_all()
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;

        Ok(total_bytes)
    }
}

/// Temporary sibling path used for atomic replacement
fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(files::TEMP_FILE_SUFFIX);
    final_path.with_file_name(name)
}
