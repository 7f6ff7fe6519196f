//! Binary entry point
//!
//! Parses arguments, initializes logging, dispatches to the subcommand
//! handlers, and maps outcomes to process exit codes: 0 for success, 1 for
//! any failure, 130 when the run was interrupted.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pricing_fetcher::cli::args::{Cli, Commands};
use pricing_fetcher::cli::commands;
use pricing_fetcher::AppError;

const EXIT_INTERRUPTED: u8 = 130;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pricing_fetcher={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.log_level());

    match &cli.command {
        Commands::Download(args) => match commands::handle_download(&cli.global, args).await {
            Ok(summary) if summary.was_cancelled => ExitCode::from(EXIT_INTERRUPTED),
            Ok(summary) if summary.failed.is_empty() => ExitCode::SUCCESS,
            Ok(_) => ExitCode::FAILURE,
            Err(e) => report_error(&e),
        },
        Commands::Verify(args) => match commands::handle_verify(&cli.global, args).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => report_error(&e),
        },
    }
}

fn report_error(error: &AppError) -> ExitCode {
    if error.is_cancelled() {
        eprintln!("Interrupted");
        return ExitCode::from(EXIT_INTERRUPTED);
    }

    eprintln!("Error: {}", error);
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
    ExitCode::FAILURE
}
