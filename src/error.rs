use std::time::Duration;
use thiserror::Error;

/// 一次刷新过程中可能出现的失败
///
/// 所有变体都在刷新编排层被吸收，不会传播到HTTP处理函数。
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("列举对象失败 (前缀 {prefix}): {source}")]
    Listing {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("前缀 {0} 下没有符合命名规则的快照")]
    NotFound(String),

    #[error("下载快照 {name} 失败: {source}")]
    Download {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} 超时 ({}秒)", .timeout.as_secs())]
    Timeout { operation: String, timeout: Duration },

    #[error("快照解码失败: {0}")]
    Decode(String),

    #[error("更新计数器失败: {0}")]
    Reconcile(String),
}

impl From<serde_json::Error> for RefreshError {
    fn from(e: serde_json::Error) -> Self {
        RefreshError::Decode(e.to_string())
    }
}

impl From<prometheus::Error> for RefreshError {
    fn from(e: prometheus::Error) -> Self {
        RefreshError::Reconcile(e.to_string())
    }
}
