use anyhow::Result;
use dotenv::dotenv;
use log::{error, info};
use xray_stats_exporter::bootstrap::bootstrap;
use xray_stats_exporter::config::Config;
use xray_stats_exporter::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载环境变量
    dotenv().ok();

    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            // 日志目录来自配置，配置失败时退回到只输出终端
            init_logger(None)?;
            error!("配置错误: {}", e);
            std::process::exit(1);
        }
    };

    init_logger(config.log_dir.as_deref())?;

    let version = env!("CARGO_PKG_VERSION");
    info!("配置已加载");

    if let Err(e) = bootstrap(version, config).await {
        error!("启动错误: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
