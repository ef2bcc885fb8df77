use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::SnapshotRef;

/// 距上次尝试是否已满 `min_interval`
///
/// 从未尝试过时总是放行。`now` 早于上次尝试时视为仍在间隔内：
/// 并发抓取在锁外取得的时间可能略早于前一次刷新记录的时间。
pub fn should_attempt(
    now: DateTime<Utc>,
    last_attempt: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    let Some(last) = last_attempt else {
        return true;
    };

    match now.signed_duration_since(last).to_std() {
        Ok(elapsed) => elapsed >= min_interval,
        Err(_) => false,
    }
}

/// 候选快照是否尚未应用过
pub fn is_new(candidate: &SnapshotRef, last_applied: Option<&SnapshotRef>) -> bool {
    last_applied != Some(candidate)
}
