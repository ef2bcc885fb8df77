use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONTAINER, DEFAULT_PORT, DEFAULT_SERVER_ID, DEFAULT_STATS_DIR,
    DEFAULT_STORAGE_TIMEOUT_SECONDS, DEFAULT_UPDATE_EVERY_SECONDS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 基本配置
    pub server_id: String,
    pub port: u16,
    pub update_every: Duration,

    // 存储配置
    pub storage: String,
    pub azure_opts: Option<AzureStorageConfig>,
    pub stats_dir: PathBuf,
    pub storage_timeout: Duration,

    // 日志
    pub log_dir: Option<PathBuf>,
}

/// Azure Blob 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureStorageConfig {
    pub account: String,
    pub container: String,
    pub endpoint: String,
    pub sas_token: Option<String>,
    pub bearer_token: Option<String>,
}

impl Config {
    // 创建默认的.env文件模板（如果不存在）
    fn create_default_env_file() -> Result<()> {
        let env_path = ".env";
        if !Path::new(env_path).exists() {
            let env_content =
                "# 存储账户名称（使用azure存储时必填）\n\
                 AZURE_STORAGE_ACCOUNT_NAME=\n\
                 # 容器名称（可选，默认xray-stats）\n\
                 # AZURE_CONTAINER_NAME=xray-stats\n\
                 # 服务器标识，同时作为对象名前缀和指标标签（可选，默认unknown-server）\n\
                 # XRAY_SERVER_ID=unknown-server\n\
                 # 监听端口（可选，默认9101）\n\
                 # PORT=9101\n\
                 # 两次刷新之间的最小间隔秒数（可选，默认30）\n\
                 # METRICS_UPDATE_EVERY_SECONDS=30\n\
                 # 存储类型 azure 或 file（可选，默认azure）\n\
                 # STATS_STORAGE=azure\n\
                 # file存储的根目录（可选，默认stats）\n\
                 # STATS_DIR=stats\n\
                 \n\
                 # Azure认证，二选一（可选）:\n\
                 # AZURE_STORAGE_SAS_TOKEN=sv=...&sig=...\n\
                 # AZURE_STORAGE_BEARER_TOKEN=\n\
                 # 自定义端点，例如Azurite（可选）\n\
                 # AZURE_STORAGE_ENDPOINT=http://127.0.0.1:10000/devstoreaccount1\n\
                 # 单次存储请求超时秒数（可选，默认10）\n\
                 # STORAGE_TIMEOUT_SECONDS=10\n\
                 # 日志文件目录（可选，不设置则只输出到终端）\n\
                 # LOG_DIR=logs\n";

            fs::write(env_path, env_content)?;
            info!("已创建.env文件模板，请填写必要的配置项");
        }
        Ok(())
    }

    pub fn new() -> Result<Self> {
        // 尝试创建默认的.env文件模板
        Self::create_default_env_file()?;

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，`new` 使用进程环境变量
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let server_id = get("XRAY_SERVER_ID").unwrap_or_else(|| DEFAULT_SERVER_ID.to_string());
        if server_id.contains('/') {
            return Err(anyhow!("XRAY_SERVER_ID不能包含'/': {}", server_id));
        }

        let port = match get("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| anyhow!("PORT必须是有效的端口号: {}", v))?,
            None => DEFAULT_PORT,
        };

        let update_every = Duration::from_secs(parse_secs(
            get("METRICS_UPDATE_EVERY_SECONDS"),
            "METRICS_UPDATE_EVERY_SECONDS",
            DEFAULT_UPDATE_EVERY_SECONDS,
        )?);

        let storage_timeout = Duration::from_secs(parse_secs(
            get("STORAGE_TIMEOUT_SECONDS"),
            "STORAGE_TIMEOUT_SECONDS",
            DEFAULT_STORAGE_TIMEOUT_SECONDS,
        )?);
        if storage_timeout.is_zero() {
            return Err(anyhow!("STORAGE_TIMEOUT_SECONDS必须大于0"));
        }

        let storage = get("STATS_STORAGE")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "azure".to_string());

        let azure_opts = match storage.as_str() {
            "azure" => Some(Self::parse_azure_config(&get)?),
            "file" => None,
            other => return Err(anyhow!("未知的存储类型: {}", other)),
        };

        let stats_dir = PathBuf::from(get("STATS_DIR").unwrap_or_else(|| DEFAULT_STATS_DIR.to_string()));
        let log_dir = get("LOG_DIR").map(PathBuf::from);

        Ok(Config {
            server_id,
            port,
            update_every,
            storage,
            azure_opts,
            stats_dir,
            storage_timeout,
            log_dir,
        })
    }

    fn parse_azure_config<G>(get: &G) -> Result<AzureStorageConfig>
    where
        G: Fn(&str) -> Option<String>,
    {
        let account = get("AZURE_STORAGE_ACCOUNT_NAME")
            .ok_or_else(|| anyhow!("AZURE_STORAGE_ACCOUNT_NAME环境变量未设置或为空，请在.env文件中填写必要的配置项"))?;

        let container = get("AZURE_CONTAINER_NAME").unwrap_or_else(|| DEFAULT_CONTAINER.to_string());

        let endpoint = get("AZURE_STORAGE_ENDPOINT")
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", account));
        let endpoint = if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            format!("https://{}", endpoint)
        } else {
            endpoint
        };

        // SAS令牌允许带或不带前导'?'
        let sas_token = get("AZURE_STORAGE_SAS_TOKEN").map(|t| t.trim_start_matches('?').to_string());
        let bearer_token = get("AZURE_STORAGE_BEARER_TOKEN");

        Ok(AzureStorageConfig {
            account,
            container,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            sas_token,
            bearer_token,
        })
    }

    /// 该服务器快照对象的列举前缀
    pub fn snapshot_prefix(&self) -> String {
        format!("{}/", self.server_id)
    }
}

fn parse_secs(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| anyhow!("{}必须是非负整数秒数: {}", key, v)),
        None => Ok(default),
    }
}
