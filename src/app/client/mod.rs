//! HTTP transport for the price-list origin
//!
//! This module provides the pooled HTTP client used by the downloader. It
//! issues two request shapes — metadata probes (HEAD) and conditional
//! streaming fetches (GET with `If-None-Match`) — each wrapped in a bounded
//! retry policy with exponential backoff.
//!
//! # Module Organization
//!
//! - [`config`] - Connection pool configuration and client construction
//! - [`http`] - Probe and fetch operations with retry logic

pub mod config;
pub mod http;

pub use config::ClientConfig;
pub use http::{FetchBody, FetchOutcome, PricingClient, ProbeMetadata};
