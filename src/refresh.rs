use chrono::{DateTime, Utc};
use log::{debug, error, info, log, warn, Level};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::RefreshError;
use crate::gate::{is_new, should_attempt};
use crate::locator::locate;
use crate::metrics::TrafficMetrics;
use crate::parser::parse;
use crate::storage::Storage;
use crate::types::SnapshotRef;
use crate::util::bounded;

/// 刷新过程的进程级状态，只由 `Refresher` 串行修改
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    pub last_applied: Option<SnapshotRef>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: bool,
    pub last_snapshot_timestamp: Option<u64>,
}

/// 一次 `refresh_if_due` 的结果
#[derive(Debug)]
pub enum RefreshOutcome {
    /// 距上次尝试不足最小间隔，什么都没做
    Throttled,
    /// 列举失败或没有符合命名规则的快照
    NotFound(RefreshError),
    /// 最新快照已经应用过，只刷新了尝试时间
    Unchanged(SnapshotRef),
    Applied { snapshot_ref: SnapshotRef, users: usize },
    /// 下载、解码或更新计数器失败，下次会重试同一个快照
    Failed { snapshot_ref: SnapshotRef, error: RefreshError },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }
}

pub struct Refresher {
    storage: Arc<dyn Storage>,
    metrics: Arc<TrafficMetrics>,
    prefix: String,
    min_interval: Duration,
    io_timeout: Duration,
    state: RwLock<RefreshState>,
    // 整个刷新过程持有，防止并发抓取交错执行清空和重建
    refresh_lock: Mutex<()>,
}

impl Refresher {
    pub fn new(
        storage: Arc<dyn Storage>,
        metrics: Arc<TrafficMetrics>,
        prefix: impl Into<String>,
        min_interval: Duration,
        io_timeout: Duration,
    ) -> Self {
        Refresher {
            storage,
            metrics,
            prefix: prefix.into(),
            min_interval,
            io_timeout,
            state: RwLock::new(RefreshState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config, storage: Arc<dyn Storage>, metrics: Arc<TrafficMetrics>) -> Self {
        Self::new(
            storage,
            metrics,
            config.snapshot_prefix(),
            config.update_every,
            config.storage_timeout,
        )
    }

    pub fn metrics(&self) -> &TrafficMetrics {
        &self.metrics
    }

    /// 当前状态的副本，不等待进行中的刷新
    pub fn state(&self) -> RefreshState {
        self.read_state().clone()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RefreshState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RefreshState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 每次抓取时调用：节流 → 定位 → 去重 → 解码 → 重建计数器
    ///
    /// 所有失败都在这里吸收，只通过 `last_update_success` 指标和返回值体现。
    pub async fn refresh_if_due(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;

        let (last_attempt, last_applied) = {
            let state = self.read_state();
            (state.last_attempt, state.last_applied.clone())
        };

        if !should_attempt(now, last_attempt, self.min_interval) {
            debug!("距上次刷新不足{}秒，跳过", self.min_interval.as_secs());
            return RefreshOutcome::Throttled;
        }

        let snapshot_ref = match locate(self.storage.as_ref(), &self.prefix, self.io_timeout).await {
            Ok(snapshot_ref) => snapshot_ref,
            Err(e) => {
                match &e {
                    RefreshError::NotFound(_) => warn!("没有找到有效的统计快照 (服务器前缀 {})", self.prefix),
                    _ => error!("定位最新快照失败: {}", e),
                }
                self.metrics.mark_failure();
                self.write_state().last_success = false;
                return RefreshOutcome::NotFound(e);
            }
        };

        if !is_new(&snapshot_ref, last_applied.as_ref()) {
            debug!("快照 {} 已处理过", snapshot_ref);
            self.write_state().last_attempt = Some(now);
            return RefreshOutcome::Unchanged(snapshot_ref);
        }

        match self.apply(&snapshot_ref).await {
            Ok(users) => {
                {
                    let mut state = self.write_state();
                    state.last_applied = Some(snapshot_ref.clone());
                    state.last_attempt = Some(now);
                    state.last_success = true;
                    state.last_snapshot_timestamp = Some(snapshot_ref.timestamp());
                }
                info!("已从 {} 更新指标 (用户数: {})", snapshot_ref, users);
                RefreshOutcome::Applied { snapshot_ref, users }
            }
            Err(error) => {
                log!(failure_level(&error), "处理快照 {} 失败: {}", snapshot_ref, error);
                self.metrics.mark_failure();
                self.write_state().last_success = false;
                RefreshOutcome::Failed { snapshot_ref, error }
            }
        }
    }

    async fn apply(&self, snapshot_ref: &SnapshotRef) -> Result<usize, RefreshError> {
        let raw = bounded("下载对象", self.io_timeout, async {
            self.storage
                .get_object(snapshot_ref.name())
                .await
                .map_err(|source| RefreshError::Download {
                    name: snapshot_ref.name().to_string(),
                    source,
                })
        })
        .await?;

        let snapshot = parse(&raw)?;
        self.metrics.reconcile(&snapshot, snapshot_ref)?;
        Ok(snapshot.len())
    }
}

// 快照内容损坏属于数据问题，下次刷新可能自行恢复，按警告记录
fn failure_level(error: &RefreshError) -> Level {
    match error {
        RefreshError::Decode(_) => Level::Warn,
        _ => Level::Error,
    }
}
