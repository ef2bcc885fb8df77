use log::debug;
use std::time::Duration;

use crate::error::RefreshError;
use crate::storage::Storage;
use crate::types::SnapshotRef;
use crate::util::bounded;

/// 在一组对象名中选出时间戳最大的快照
///
/// 不符合 `<timestamp>.json` 规则的名称被忽略；时间戳相同时取字典序最大的名称，
/// 因此同一组输入无论顺序如何结果都相同。
pub fn select_latest<I, S>(names: I) -> Option<SnapshotRef>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let parsed = SnapshotRef::parse(name.as_ref());
            if parsed.is_none() {
                debug!("跳过不符合命名规则的对象: {}", name.as_ref());
            }
            parsed
        })
        .max()
}

/// 列举 `prefix` 下的对象并返回最新的快照引用
pub async fn locate(
    storage: &dyn Storage,
    prefix: &str,
    timeout: Duration,
) -> Result<SnapshotRef, RefreshError> {
    let names = bounded("列举对象", timeout, async {
        storage
            .list_objects(prefix)
            .await
            .map_err(|source| RefreshError::Listing {
                prefix: prefix.to_string(),
                source,
            })
    })
    .await;

    let names = names?;
    debug!("前缀 {} 下共有 {} 个对象", prefix, names.len());
    select_latest(&names).ok_or_else(|| RefreshError::NotFound(prefix.to_string()))
}
