//! Resilient downloader for AWS price-list JSON documents
//!
//! Downloads the public price-list offer index and per-service pricing
//! documents with conditional HTTP caching, SHA-256 integrity verification,
//! bounded concurrency, and atomic artifact writes. Re-running against
//! unchanged origin content transfers nothing: each artifact carries a
//! sidecar record with its hash and etag, and a cheap metadata probe decides
//! whether a fetch is needed at all.
//!
//! # Module Organization
//!
//! - [`app`] - Transport, stores, metrics, and the download orchestrator
//! - [`cli`] - Command-line interface
//! - [`config`] - Runtime configuration with TOML and CLI layering
//! - [`constants`] - Application-wide constants
//! - [`errors`] - Error types for every component

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

pub use errors::{AppError, Result};
