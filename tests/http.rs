use axum::body::{self, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;
use xray_stats_exporter::metrics::TrafficMetrics;
use xray_stats_exporter::refresh::Refresher;
use xray_stats_exporter::server::{create_router, AppState};
use xray_stats_exporter::storage::FileStorage;

fn write_snapshot(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn app(root: &Path, min_interval: Duration) -> Router {
    let storage = Arc::new(FileStorage::new(root.to_path_buf()));
    let metrics = Arc::new(TrafficMetrics::new("server-01").unwrap());
    let refresher = Arc::new(Refresher::new(
        storage,
        metrics,
        "server-01/",
        min_interval,
        Duration::from_secs(5),
    ));
    create_router(AppState {
        refresher,
        server_id: "server-01".to_string(),
    })
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn scrape_exports_latest_snapshot() {
    let dir = tempdir().unwrap();
    write_snapshot(
        dir.path(),
        "server-01/1700000000.json",
        r#"{"users": {"u1": {"up": 1, "down": 1}}}"#,
    );
    write_snapshot(
        dir.path(),
        "server-01/1700000300.json",
        r#"{"users": {"u1@example.com": {"up": 123456, "down": 789012}}, "timestamp": 1700000300}"#,
    );
    write_snapshot(dir.path(), "server-01/notes.txt", "ignored");

    let app = app(dir.path(), Duration::from_secs(30));
    let (status, content_type, text) = get(&app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
    assert!(text.contains(
        "xray_user_uplink_bytes_total{server_id=\"server-01\",user=\"u1@example.com\"} 123456"
    ));
    assert!(text.contains(
        "xray_user_traffic_bytes_total{server_id=\"server-01\",user=\"u1@example.com\"} 912468"
    ));
    assert!(!text.contains("user=\"u1\""));
    assert!(text.contains("xray_last_update_success 1"));
    assert!(text.contains("xray_last_blob_timestamp_seconds 1700000300"));
}

#[tokio::test]
async fn health_reports_applied_snapshot() {
    let dir = tempdir().unwrap();
    write_snapshot(dir.path(), "server-01/1700000000.json", r#"{"users": {}}"#);

    let app = app(dir.path(), Duration::from_secs(30));

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["server_id"], "server-01");
    assert!(health["last_blob"].is_null());
    assert_eq!(health["last_update"], "1970-01-01 00:00:00");

    get(&app, "/metrics").await;

    let (_, _, body) = get(&app, "/health").await;
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["last_blob"], "server-01/1700000000.json");
    assert_ne!(health["last_update"], "1970-01-01 00:00:00");
}

#[tokio::test]
async fn failures_still_return_ok() {
    let dir = tempdir().unwrap();
    let app = app(dir.path(), Duration::ZERO);

    // 没有任何快照
    let (status, _, text) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("xray_last_update_success 0"));
    assert!(!text.contains("xray_user_uplink_bytes_total{"));

    write_snapshot(
        dir.path(),
        "server-01/100.json",
        r#"{"users": {"u1": {"up": 10, "down": 20}, "u2": {"up": 5, "down": 5}}}"#,
    );
    let (_, _, text) = get(&app, "/metrics").await;
    assert!(text.contains("xray_last_update_success 1"));

    // 新快照无法解码：保留旧计数器，成功标志清零
    write_snapshot(dir.path(), "server-01/200.json", "{ not json");
    let (status, _, text) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("xray_last_update_success 0"));
    assert!(text.contains("xray_user_traffic_bytes_total{server_id=\"server-01\",user=\"u2\"} 10"));
    assert!(text.contains("xray_last_blob_timestamp_seconds 100"));

    // 修复后重试同一个快照
    write_snapshot(
        dir.path(),
        "server-01/200.json",
        r#"{"users": {"u1": {"up": 15, "down": 25}}}"#,
    );
    let (_, _, text) = get(&app, "/metrics").await;
    assert!(text.contains("xray_last_update_success 1"));
    assert!(text.contains("xray_user_traffic_bytes_total{server_id=\"server-01\",user=\"u1\"} 40"));
    assert!(!text.contains("user=\"u2\""));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let dir = tempdir().unwrap();
    let app = app(dir.path(), Duration::from_secs(30));
    let (status, _, _) = get(&app, "/files/abc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
