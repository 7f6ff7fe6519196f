//! Subcommand handlers
//!
//! Each handler layers CLI overrides onto the loaded configuration, runs
//! the corresponding operation, and prints a human-readable report. Exit
//! codes are derived by `main` from the returned values.

use std::path::Path;

use tracing::info;

use crate::app::downloader::{BatchSummary, Downloader, ShutdownToken, SignalHandler};
use crate::app::integrity::IntegrityStore;
use crate::config::FetcherConfig;
use crate::constants::files;
use crate::errors::Result;

use super::args::{DownloadArgs, GlobalArgs, VerifyArgs};

/// Run the download subcommand
///
/// # Errors
///
/// Returns an error for configuration problems or an index-level failure;
/// per-service failures are reported inside the returned summary instead.
pub async fn handle_download(global: &GlobalArgs, args: &DownloadArgs) -> Result<BatchSummary> {
    let mut config = load_config(global)?;
    apply_download_overrides(&mut config, args);
    config.validate()?;

    let token = ShutdownToken::new();
    let signal_task = SignalHandler::new(token.clone()).setup();

    let downloader = Downloader::new(config, token).await?;
    let codes = if args.services.is_empty() {
        None
    } else {
        Some(args.services.clone())
    };

    let summary = downloader.fetch_all(codes).await?;

    if let Some(path) = downloader.export_metrics().await {
        info!(path = %path.display(), "Metrics written");
    }
    signal_task.abort();

    print_summary(&summary);
    Ok(summary)
}

/// Run the verify subcommand, re-hashing stored artifacts against their
/// sidecar records
///
/// Returns `true` when every checked artifact verified.
pub async fn handle_verify(global: &GlobalArgs, args: &VerifyArgs) -> Result<bool> {
    let mut config = load_config(global)?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }

    let store = IntegrityStore::new(&config);
    let keys = if args.services.is_empty() {
        stored_keys(&config.output_dir).await?
    } else {
        args.services.clone()
    };

    if keys.is_empty() {
        println!("No artifacts found in {}", config.output_dir.display());
        return Ok(true);
    }

    let mut all_ok = true;
    for key in &keys {
        match store.verify(key).await {
            Ok(()) => println!("ok      {}", key),
            Err(e) => {
                all_ok = false;
                println!("FAILED  {}: {}", key, e);
            }
        }
    }

    println!(
        "\nVerified {} artifact(s): {}",
        keys.len(),
        if all_ok { "all ok" } else { "FAILURES DETECTED" }
    );
    Ok(all_ok)
}

fn load_config(global: &GlobalArgs) -> Result<FetcherConfig> {
    match &global.config {
        Some(path) => Ok(FetcherConfig::from_file(path)?),
        None => Ok(FetcherConfig::default()),
    }
}

fn apply_download_overrides(config: &mut FetcherConfig, args: &DownloadArgs) {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &args.metrics_dir {
        config.metrics_dir = dir.clone();
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_downloads = n;
    }
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if args.no_verify {
        config.verify_integrity = false;
    }
}

/// Keys of every artifact file stored in the output directory, sorted
async fn stored_keys(output_dir: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(keys),
    };

    while let Some(entry) = entries.next_entry().await.map_err(crate::errors::AppError::Io)? {
        let path = entry.path();
        let is_artifact = path
            .extension()
            .map(|ext| ext == files::ARTIFACT_EXTENSION)
            .unwrap_or(false);
        if !is_artifact {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            keys.push(stem.to_string());
        }
    }

    keys.sort();
    Ok(keys)
}

fn print_summary(summary: &BatchSummary) {
    println!("\nDownload summary");
    println!("  succeeded:   {}", summary.succeeded.len());
    println!("  cache hits:  {}", summary.cache_hits);
    println!("  failed:      {}", summary.failed.len());
    println!("  total bytes: {}", summary.total_bytes);

    for (code, error) in &summary.failed {
        println!("  FAILED {}: {}", code, error);
    }

    if summary.was_cancelled {
        println!(
            "  interrupted: {} download(s) did not run",
            summary.cancelled.len()
        );
    }
}
