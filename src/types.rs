use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::SNAPSHOT_SUFFIX;

/// 快照对象的引用：完整对象名及从文件名中解析出的Unix时间戳
///
/// 两个引用相等当且仅当对象名完全相同；排序先按时间戳，再按对象名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotRef {
    name: String,
    timestamp: u64,
}

impl SnapshotRef {
    /// 解析 `<server_id>/<timestamp>.json` 形式的对象名，只检查最后一段路径
    pub fn parse(name: &str) -> Option<Self> {
        let filename = name.rsplit('/').next()?;
        let ts_str = filename.strip_suffix(SNAPSHOT_SUFFIX)?;
        if ts_str.is_empty() || !ts_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let timestamp = ts_str.parse::<u64>().ok()?;
        Some(SnapshotRef {
            name: name.to_string(),
            timestamp,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl Ord for SnapshotRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for SnapshotRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTraffic {
    pub up: u64,
    pub down: u64,
}

impl UserTraffic {
    pub fn new(up: u64, down: u64) -> Self {
        UserTraffic { up, down }
    }

    pub fn total(&self) -> Option<u64> {
        self.up.checked_add(self.down)
    }
}

/// 某一时刻单台服务器所有用户的流量报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub users: BTreeMap<String, UserTraffic>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
