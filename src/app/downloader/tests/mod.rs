//! End-to-end downloader tests against an in-process origin

use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::app::test_support::MockOrigin;
use crate::errors::AppError;

fn test_config(base_url: String, dir: &TempDir) -> FetcherConfig {
    FetcherConfig {
        base_url,
        output_dir: dir.path().join("data"),
        metrics_dir: dir.path().join("metrics"),
        max_retries: 2,
        retry_min_wait: Duration::from_millis(5),
        retry_max_wait: Duration::from_millis(20),
        max_concurrent_downloads: 4,
        ..Default::default()
    }
}

async fn downloader_for(origin: &MockOrigin, dir: &TempDir) -> Downloader {
    Downloader::new(test_config(origin.base_url(), dir), ShutdownToken::new())
        .await
        .unwrap()
}

async fn install_service(origin: &MockOrigin, code: &str, body: &[u8], etag: &str) {
    origin
        .route(&format!("/{}/current/index.json", code))
        .body(body.to_vec())
        .etag(etag)
        .install()
        .await;
}

#[test]
fn test_parse_index_extracts_service_codes() {
    let codes =
        Downloader::parse_index(br#"{"offers": {"AmazonEC2": {}, "AmazonS3": {}}}"#).unwrap();
    assert_eq!(codes, vec!["AmazonEC2", "AmazonS3"]);
}

#[test]
fn test_parse_index_tolerates_empty_catalog() {
    assert!(Downloader::parse_index(br#"{"offers": null}"#)
        .unwrap()
        .is_empty());
    assert!(Downloader::parse_index(br#"{}"#).unwrap().is_empty());
}

#[test]
fn test_parse_index_rejects_invalid_json() {
    let err = Downloader::parse_index(b"<html>not json</html>").unwrap_err();
    assert!(matches!(err, DownloadError::IndexFormat { .. }));
}

#[tokio::test]
async fn test_fetch_all_discovers_services_from_index() {
    let origin = MockOrigin::start().await;
    origin
        .route("/index.json")
        .body(br#"{"offers": {"AmazonEC2": {}, "AmazonS3": {}}}"#.to_vec())
        .etag("\"idx\"")
        .install()
        .await;
    install_service(&origin, "AmazonEC2", br#"{"product": "compute"}"#, "\"e1\"").await;
    install_service(&origin, "AmazonS3", br#"{"product": "storage"}"#, "\"s1\"").await;

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;

    let summary = downloader.fetch_all(None).await.unwrap();
    assert!(summary.is_complete_success());
    assert_eq!(summary.total(), 2);

    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["AmazonEC2", "AmazonS3"]);

    // Index, artifacts, and integrity sidecars are all on disk
    let data = dir.path().join("data");
    assert!(data.join("index.json").exists());
    for code in ["AmazonEC2", "AmazonS3"] {
        assert!(data.join(format!("{}.json", code)).exists());
        assert!(data.join(format!("{}.sha256", code)).exists());
    }
}

#[tokio::test]
async fn test_index_failure_is_fatal() {
    let origin = MockOrigin::start().await;
    // No index route installed: the origin answers 404

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;

    let err = downloader.fetch_all(None).await.unwrap_err();
    assert!(matches!(err, AppError::Download(_)));
}

#[tokio::test]
async fn test_second_run_is_all_cache_hits() {
    let origin = MockOrigin::start().await;
    let payload = br#"{"product": "compute", "terms": {}}"#;
    install_service(&origin, "AmazonEC2", payload, "\"v1\"").await;

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;
    let codes = vec!["AmazonEC2".to_string()];
    let path = "/AmazonEC2/current/index.json";

    let first = downloader.fetch_all(Some(codes.clone())).await.unwrap();
    assert!(first.is_complete_success());
    assert_eq!(first.cache_hits, 0);
    assert_eq!(first.total_bytes, payload.len() as u64);
    assert_eq!(origin.hits(path).await, 2); // probe + fetch

    let second = downloader.fetch_all(Some(codes)).await.unwrap();
    assert!(second.is_complete_success());
    assert_eq!(second.cache_hits, 1);
    assert_eq!(second.total_bytes, payload.len() as u64);
    // The second run decided from the probe alone; no content transfer
    assert_eq!(origin.hits(path).await, 3);

    let metrics = downloader.metrics();
    let sink = metrics.lock().await;
    assert_eq!(sink.records().len(), 2);
    assert!(sink.records()[1].cache_hit);
}

#[tokio::test]
async fn test_not_modified_reply_counts_as_cache_hit() {
    let origin = MockOrigin::start().await;
    let payload = br#"{"product": "queue"}"#;
    install_service(&origin, "AmazonSQS", payload, "\"v1\"").await;

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;
    let url = downloader.client.service_url("AmazonSQS").unwrap();

    downloader.fetch_one("AmazonSQS", &url).await.unwrap();

    // The probe now advertises a different etag, but the fetch itself still
    // validates the stored one and replies 304
    origin
        .route("/AmazonSQS/current/index.json")
        .body(payload.to_vec())
        .etag("\"v1\"")
        .head_etag("\"v2\"")
        .install()
        .await;

    let report = downloader.fetch_one("AmazonSQS", &url).await.unwrap();
    assert!(report.cache_hit);
    assert_eq!(report.size_bytes, payload.len() as u64);

    let content = tokio::fs::read(&report.path).await.unwrap();
    assert_eq!(content, payload);
}

#[tokio::test]
async fn test_corrupt_artifact_is_refetched() {
    let origin = MockOrigin::start().await;
    let payload = br#"{"product": "database"}"#;
    install_service(&origin, "AmazonRDS", payload, "\"v1\"").await;

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;
    let url = downloader.client.service_url("AmazonRDS").unwrap();

    let first = downloader.fetch_one("AmazonRDS", &url).await.unwrap();
    tokio::fs::write(&first.path, b"truncated garba").await.unwrap();

    // Same remote etag, so only the hash check can expose the damage
    let second = downloader.fetch_one("AmazonRDS", &url).await.unwrap();
    assert!(!second.cache_hit);
    assert_eq!(tokio::fs::read(&second.path).await.unwrap(), payload);
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let origin = MockOrigin::start().await;
    install_service(&origin, "SvcA", br#"{"a": 1}"#, "\"a\"").await;
    // SvcB has no route and will 404
    install_service(&origin, "SvcC", br#"{"c": 3}"#, "\"c\"").await;

    let dir = TempDir::new().unwrap();
    let downloader = downloader_for(&origin, &dir).await;

    let codes = vec!["SvcA".to_string(), "SvcB".to_string(), "SvcC".to_string()];
    let summary = downloader.fetch_all(Some(codes)).await.unwrap();

    assert_eq!(summary.succeeded, vec!["SvcA", "SvcC"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "SvcB");
    assert!(summary.failed[0].1.contains("404"));
    assert!(!summary.was_cancelled);

    let data = dir.path().join("data");
    assert!(data.join("SvcA.json").exists());
    assert!(!data.join("SvcB.json").exists());
    assert!(data.join("SvcC.json").exists());

    let metrics = downloader.metrics();
    let sink = metrics.lock().await;
    assert_eq!(sink.records().len(), 3);
    let failure = sink
        .records()
        .iter()
        .find(|r| r.service_code == "SvcB")
        .unwrap();
    assert!(!failure.success);
    assert!(failure.error.is_some());
}

#[tokio::test]
async fn test_concurrency_never_exceeds_ceiling() {
    let origin = MockOrigin::start().await;
    let codes: Vec<String> = (0..6).map(|i| format!("Svc{}", i)).collect();
    for code in &codes {
        origin
            .route(&format!("/{}/current/index.json", code))
            .body(br#"{"x": 1}"#.to_vec())
            .etag("\"v\"")
            .delay(Duration::from_millis(25))
            .install()
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = test_config(origin.base_url(), &dir);
    config.max_concurrent_downloads = 2;
    let downloader = Downloader::new(config, ShutdownToken::new()).await.unwrap();

    let summary = downloader.fetch_all(Some(codes)).await.unwrap();
    assert!(summary.is_complete_success());
    assert_eq!(summary.succeeded.len(), 6);
    assert!(
        origin.max_active() <= 2,
        "observed {} simultaneous requests",
        origin.max_active()
    );
}

#[tokio::test]
async fn test_pre_triggered_shutdown_skips_every_key() {
    let origin = MockOrigin::start().await;
    install_service(&origin, "SvcA", br#"{"a": 1}"#, "\"a\"").await;

    let dir = TempDir::new().unwrap();
    let token = ShutdownToken::new();
    token.trigger();
    let downloader = Downloader::new(test_config(origin.base_url(), &dir), token)
        .await
        .unwrap();

    let codes = vec!["SvcA".to_string(), "SvcB".to_string()];
    let summary = downloader.fetch_all(Some(codes)).await.unwrap();

    assert!(summary.was_cancelled);
    assert!(summary.succeeded.is_empty());
    assert_eq!(summary.cancelled.len(), 2);
    assert_eq!(origin.hits("/SvcA/current/index.json").await, 0);
}

#[tokio::test]
async fn test_mid_run_shutdown_leaves_no_temp_files() {
    let origin = MockOrigin::start().await;
    let codes: Vec<String> = (0..4).map(|i| format!("Svc{}", i)).collect();
    for code in &codes {
        origin
            .route(&format!("/{}/current/index.json", code))
            .body(vec![b'x'; 4096])
            .etag("\"v\"")
            .delay(Duration::from_millis(50))
            .install()
            .await;
    }

    let dir = TempDir::new().unwrap();
    let token = ShutdownToken::new();
    let downloader = Downloader::new(test_config(origin.base_url(), &dir), token.clone())
        .await
        .unwrap();

    let runner = {
        let downloader = downloader.clone();
        tokio::spawn(async move { downloader.fetch_all(Some(codes)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.trigger();

    let summary = runner.await.unwrap().unwrap();
    assert!(summary.was_cancelled);
    assert!(!summary.cancelled.is_empty());

    // Whatever was in flight unwound without leaving partial files behind
    let mut entries = tokio::fs::read_dir(dir.path().join("data")).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name();
        assert!(
            !name.to_string_lossy().ends_with(".tmp"),
            "leftover temp file: {:?}",
            name
        );
    }
}
