use anyhow::Result;
use colored::Colorize;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use crate::config::Config;
use crate::metrics::TrafficMetrics;
use crate::refresh::Refresher;
use crate::server::{create_router, start_server, AppState};
use crate::storage::get_storage;

pub async fn bootstrap(version: &str, config: Config) -> Result<()> {
    // 打印启动信息
    info!("{}", format!("启动 xray-stats-exporter {}", version).green());
    info!(
        "服务器: {}, 刷新间隔: {}秒, 存储超时: {}秒",
        config.server_id,
        config.update_every.as_secs(),
        config.storage_timeout.as_secs()
    );

    let storage = get_storage(&config)?;
    let metrics = Arc::new(TrafficMetrics::new(&config.server_id)?);
    let refresher = Arc::new(Refresher::from_config(&config, storage, metrics));

    let router = create_router(AppState {
        refresher,
        server_id: config.server_id.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    start_server(router, addr, shutdown_signal()).await?;

    info!("服务已成功关闭");
    Ok(())
}

// 处理终止信号
async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("收到终止信号，开始关闭服务..."),
        Err(e) => error!("无法监听Ctrl+C信号: {}", e),
    }
}
