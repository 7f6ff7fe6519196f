//! Core application components for the pricing fetcher
//!
//! This module contains the engine of the application: the HTTP transport,
//! the integrity and artifact stores, metrics collection, and the download
//! orchestrator that ties them together.
//!
//! # Architecture
//!
//! - [`client`] - HTTP transport: probes, conditional streaming fetches,
//!   retry policy
//! - [`integrity`] - SHA-256 sidecar records and fetch decisions
//! - [`storage`] - Atomic, streamed artifact persistence
//! - [`metrics`] - Per-download outcome records and aggregates
//! - [`downloader`] - Orchestration, concurrency gate, shutdown handling

pub mod client;
pub mod downloader;
pub mod integrity;
pub mod metrics;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{FetchBody, FetchOutcome, PricingClient, ProbeMetadata};
pub use downloader::{BatchSummary, Downloader, KeyReport, ShutdownToken, SignalHandler};
pub use integrity::{FetchDecision, FetchReason, IntegrityRecord, IntegrityStore};
pub use metrics::{AggregateStats, DownloadRecord, MetricsSink};
pub use storage::ArtifactStore;
