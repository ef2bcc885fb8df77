use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use std::sync::Arc;

use crate::config::Config;
use crate::storage::azure_blob::AzureBlobStorage;
use crate::storage::file::FileStorage;

/// 远程对象存储：按前缀列举对象名，按名称读取对象内容
#[async_trait]
pub trait Storage: Send + Sync {
    /// 返回所有以 `prefix` 开头的对象的完整名称
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get_object(&self, name: &str) -> Result<Bytes>;

    /// 用于日志的简短描述
    fn describe(&self) -> String;
}

pub fn get_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match config.storage.as_str() {
        "file" => {
            let storage = FileStorage::new(config.stats_dir.clone());
            info!("使用文件存储: {}", storage.describe());
            Ok(Arc::new(storage))
        }
        "azure" => match &config.azure_opts {
            Some(opts) => {
                let storage = AzureBlobStorage::new(opts.clone(), config.storage_timeout)?;
                info!("使用Azure Blob存储: {}", storage.describe());
                Ok(Arc::new(storage))
            }
            None => Err(anyhow::anyhow!("使用Azure存储需要提供存储账户配置")),
        },
        _ => Err(anyhow::anyhow!("未知的存储类型: {}", config.storage)),
    }
}
