//! HTTP probes against the monitoring surface of a running app.

mod common;

use common::{Counters, Kind, config, duplex_app, eventually, plugins};
use reqwest::StatusCode;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;
use zephyr_server::App;

async fn monitored_app(base: &Path, counters: &Arc<Counters>) -> (App, DuplexStream, SocketAddr) {
    let loader = plugins(
        base,
        &[("echo", Kind::Echo), ("broken", Kind::Broken)],
        counters,
    );
    let mut config = config(base);
    config.monitoring.enabled = true;
    config.monitoring.host = "127.0.0.1".to_string();
    config.monitoring.port = 0;

    let (app, client_io) = duplex_app(config, loader);
    app.start().await.unwrap();
    let addr = app.monitoring_addr().await.unwrap();
    (app, client_io, addr)
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn post(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

/// Health reports the transport and tool count, and turns 503 when the transport ends
#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let (app, client_io, addr) = monitored_app(dir.path(), &counters).await;

    let (status, body) = get(addr, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["transport"], "stdio");
    assert_eq!(body["transport_healthy"], true);
    assert_eq!(body["tools"], 1);
    assert!(body["uptime_seconds"].is_u64());

    drop(client_io);
    let transport = app.transport();
    assert!(eventually(|| async move { !transport.is_healthy() }).await);

    let (status, body) = get(addr, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");

    app.shutdown().await.unwrap();
}

/// Metrics reflect dispatched calls
#[tokio::test]
async fn test_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let (app, _client_io, addr) = monitored_app(dir.path(), &counters).await;

    app.service()
        .dispatch("echo", Some(common::text_args("hi")), CancellationToken::new())
        .await
        .unwrap();

    let (status, body) = get(addr, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 1);
    assert_eq!(body["errors"], 0);
    assert_eq!(body["tools"]["echo"]["calls"], 1);
    assert!(body["latency"]["p99_ms"].is_f64());

    app.shutdown().await.unwrap();
}

/// Plugin status is listed and looked up by name
#[tokio::test]
async fn test_plugin_status() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let (app, _client_io, addr) = monitored_app(dir.path(), &counters).await;

    let (status, body) = get(addr, "/plugins").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["broken", "echo"]);

    let (status, echo) = get(addr, "/plugins/echo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(echo["loaded"], true);
    assert_eq!(echo["version"], "1.0.0");

    let (status, broken) = get(addr, "/plugins/broken").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(broken["loaded"], false);
    assert!(broken["last_error"].as_str().unwrap().contains("init refused"));

    let (status, body) = get(addr, "/plugins/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    app.shutdown().await.unwrap();
}

/// Reload answers 200, 404 or 500 depending on the outcome
#[tokio::test]
async fn test_reload() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let (app, _client_io, addr) = monitored_app(dir.path(), &counters).await;
    // echo and broken each initialized once at startup.
    assert_eq!(counters.inits(), 2);

    let (status, body) = post(addr, "/plugins/echo/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plugin"], "echo");
    assert_eq!(counters.inits(), 3);
    assert_eq!(counters.shutdowns(), 1);
    assert!(app.registry().contains("echo").await);

    let (status, _) = post(addr, "/plugins/nope/reload").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(addr, "/plugins/broken/reload").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("init refused"));

    app.shutdown().await.unwrap();
    assert!(app.monitoring_addr().await.is_none());
    assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());
}

/// An occupied monitoring port fails startup
#[tokio::test]
async fn test_monitoring_bind_failure() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let loader = plugins(dir.path(), &[("echo", Kind::Echo)], &counters);

    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = config(dir.path());
    config.monitoring.enabled = true;
    config.monitoring.host = "127.0.0.1".to_string();
    config.monitoring.port = occupied.local_addr().unwrap().port();

    let (app, _client_io) = duplex_app(config, loader);
    let err = app.start().await.unwrap_err();
    assert!(err.is_bind_error(), "{err}");
    assert!(!app.transport().is_healthy());
    assert_eq!(counters.shutdowns(), 1);
}
