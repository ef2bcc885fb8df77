use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::error::RefreshError;

/// 给存储I/O加上超时上限，超时映射为 `RefreshError::Timeout`
pub async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T, RefreshError>
where
    F: Future<Output = Result<T, RefreshError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RefreshError::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}

// 健康检查里使用的时间格式，从未尝试过时为Unix纪元
pub fn format_attempt_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "1970-01-01 00:00:00".to_string(),
    }
}
