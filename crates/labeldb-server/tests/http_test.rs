//! Integration tests for the HTTP endpoints.
//!
//! These tests open a real store, start a real HTTP server and make actual
//! requests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use axum::http::StatusCode;
use labeldb_server::{AppState, LayoutArg, ServerConfig};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;

struct TestServer {
    addr: SocketAddr,
    dir: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn write_input(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents)
            .expect("Failed to write test input file");
    }

    async fn post(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to send POST request to test server");
        let status = response.status();
        (status, response.json().await.expect("Response should be JSON"))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request to test server");
        let status = response.status();
        (status, response.json().await.expect("Response should be JSON"))
    }
}

/// Start test HTTP server on random port.
async fn start_test_server(layout: LayoutArg) -> TestServer {
    // Install ring crypto provider for reqwest (idempotent)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let dir = TempDir::new().expect("Failed to create temporary test directory");
    let mut config = ServerConfig::for_db_path(dir.path().join("db"));
    config.http_bind = "127.0.0.1:0"
        .parse()
        .expect("Failed to parse HTTP bind address");
    config.partitions = 4;
    config.queue_capacity = 64;
    config.workers = Some(4);
    config.layout = layout;
    config.load_root = dir.path().to_path_buf();
    config.validate().expect("Test configuration should be valid");

    let state = Arc::new(AppState::new(&config).expect("Failed to initialize AppState"));
    let app = labeldb_server::http::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind HTTP listener");
    let addr = listener
        .local_addr()
        .expect("Failed to get listener address");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("HTTP server failed to run");
    });

    TestServer {
        addr,
        dir,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_load_then_lookup() {
    let server = start_test_server(LayoutArg::Association).await;
    server.write_input("mobiles.txt", "15586520421\n18297123752\n13443134285\n");

    let (status, body) = server.post("/load/mobiles.txt/label2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["body"]["lines"], 3);
    assert!(body["body"]["cost"].is_string());

    let (status, body) = server.get("/labels/18297123752").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["body"]["labels"], serde_json::json!(["label2"]));

    let (status, body) = server.get("/labels/00000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["labels"], serde_json::json!([]));
}

#[tokio::test]
async fn test_labels_sorted_across_loads() {
    let server = start_test_server(LayoutArg::Joined).await;
    server.write_input("one.txt", "123\n");

    for label in ["B", "A", "B"] {
        let (status, _) = server.post(&format!("/load/one.txt/{label}?serial")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = server.get("/labels/123").await;
    assert_eq!(body["body"]["labels"], serde_json::json!(["A", "B"]));
}

#[tokio::test]
async fn test_noop_load_writes_nothing() {
    let server = start_test_server(LayoutArg::Association).await;
    server.write_input("dry.txt", "10\n20\n");

    let (status, body) = server.post("/load/dry.txt/dry?noop&workers=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["lines"], 2);

    let (_, body) = server.get("/labels/10").await;
    assert_eq!(body["body"]["labels"], serde_json::json!([]));
}

#[tokio::test]
async fn test_error_statuses() {
    let server = start_test_server(LayoutArg::Association).await;
    server.write_input("bad.txt", "1\nnot-a-number\n");

    let (status, body) = server.post("/load/absent.txt/x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("absent.txt"));

    let (status, body) = server.post("/load/bad.txt/x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-number"));

    let (status, _) = server.post("/load/..%2Fescape.txt/x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post("/load/bad.txt/x?workers=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.get("/labels/12ab").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_health_reports_partitions() {
    let server = start_test_server(LayoutArg::Association).await;
    server.write_input("ids.txt", "1\n2\n3\n4\n5\n");
    server.post("/load/ids.txt/h").await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["partitions"], 4);
    assert_eq!(body["body"]["layout"], "association");
    assert_eq!(body["body"]["applied"], 5);
    assert_eq!(body["body"]["writers"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_excessive_worker_count_is_rejected() {
    let server = start_test_server(LayoutArg::Association).await;
    server.write_input("tiny.txt", "1\n2\n");

    for workers in ["100000", "1099511627776"] {
        let (status, body) = server
            .post(&format!("/load/tiny.txt/x?workers={workers}"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "workers = {workers}");
        assert!(body["error"].as_str().unwrap().contains("at most"));
    }

    // The server is still serving afterwards
    let (status, body) = server.post("/load/tiny.txt/x?workers=1024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["lines"], 2);
}
