//! Command-line argument definitions

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Resilient downloader for AWS price-list JSON documents
#[derive(Debug, Parser)]
#[command(name = "pricing-fetcher", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Log level implied by the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download price lists, skipping artifacts that are already current
    Download(DownloadArgs),

    /// Verify stored artifacts against their integrity records
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Service codes to download; repeatable. Defaults to every service in
    /// the offer index
    #[arg(short, long = "service", value_name = "CODE")]
    pub services: Vec<String>,

    /// Output directory for artifacts and integrity sidecars
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for the exported metrics document
    #[arg(long, value_name = "DIR")]
    pub metrics_dir: Option<PathBuf>,

    /// Maximum number of concurrent downloads
    #[arg(short = 'j', long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Base URL of the price-list origin
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Disable integrity verification and sidecar records
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Service codes to verify; repeatable. Defaults to every artifact in
    /// the output directory
    #[arg(short, long = "service", value_name = "CODE")]
    pub services: Vec<String>,

    /// Output directory containing artifacts
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}
