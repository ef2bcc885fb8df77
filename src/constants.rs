use lazy_static::lazy_static;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9101;
pub const DEFAULT_CONTAINER: &str = "xray-stats";
pub const DEFAULT_SERVER_ID: &str = "unknown-server";
pub const DEFAULT_STATS_DIR: &str = "stats";
pub const DEFAULT_UPDATE_EVERY_SECONDS: u64 = 30;
pub const DEFAULT_STORAGE_TIMEOUT_SECONDS: u64 = 10;

/// 快照对象名的固定后缀: `<server_id>/<timestamp>.json`
pub const SNAPSHOT_SUFFIX: &str = ".json";

pub const METRIC_PREFIX: &str = "xray_";

/// Azure Blob REST API 版本
pub const AZURE_API_VERSION: &str = "2021-08-06";

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

lazy_static! {
    pub static ref DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}
