use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::constants::PROMETHEUS_CONTENT_TYPE;
use crate::refresh::Refresher;
use crate::util::format_attempt_time;

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<Refresher>,
    pub server_id: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// 每次抓取先按需刷新，再返回当前（可能已过期的）指标
async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.refresher.refresh_if_due(Utc::now()).await;

    match state.refresher.metrics().encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("编码指标失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("编码指标失败: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let refresh_state = state.refresher.state();

    Json(json!({
        "status": "healthy",
        "server_id": state.server_id,
        "last_blob": refresh_state.last_applied.as_ref().map(|r| r.name().to_string()),
        "last_update": format_attempt_time(refresh_state.last_attempt),
    }))
}

pub async fn start_server<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP服务器监听于 {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
