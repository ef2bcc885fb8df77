use anyhow::Result;
use log::debug;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::constants::METRIC_PREFIX;
use crate::error::RefreshError;
use crate::types::{Snapshot, SnapshotRef};

const LABELS: [&str; 2] = ["server_id", "user"];

/// 导出的指标集合
///
/// 三个按 (server_id, user) 打标签的计数器表示上游快照报告的累计值，
/// 每次成功刷新都会清空后按最新快照重建，因此标签集合始终等于最近一次应用的快照中的用户集合。
/// 一个进程只服务一个 server_id，计数器向量归它独占。
pub struct TrafficMetrics {
    registry: Registry,
    server_id: String,
    user_uplink_bytes: IntCounterVec,
    user_downlink_bytes: IntCounterVec,
    user_traffic_bytes: IntCounterVec,
    last_update_success: IntGauge,
    last_blob_timestamp: IntGauge,
}

impl TrafficMetrics {
    pub fn new(server_id: &str) -> Result<Self> {
        let registry = Registry::new();

        let user_uplink_bytes = IntCounterVec::new(
            Opts::new(
                format!("{}user_uplink_bytes_total", METRIC_PREFIX),
                "Total uplink bytes per user",
            ),
            &LABELS,
        )?;
        let user_downlink_bytes = IntCounterVec::new(
            Opts::new(
                format!("{}user_downlink_bytes_total", METRIC_PREFIX),
                "Total downlink bytes per user",
            ),
            &LABELS,
        )?;
        let user_traffic_bytes = IntCounterVec::new(
            Opts::new(
                format!("{}user_traffic_bytes_total", METRIC_PREFIX),
                "Total (up+down) bytes per user",
            ),
            &LABELS,
        )?;
        let last_update_success = IntGauge::new(
            format!("{}last_update_success", METRIC_PREFIX),
            "1 if last metrics update from blob was successful, 0 otherwise",
        )?;
        let last_blob_timestamp = IntGauge::new(
            format!("{}last_blob_timestamp_seconds", METRIC_PREFIX),
            "Timestamp of the latest JSON blob processed",
        )?;

        registry.register(Box::new(user_uplink_bytes.clone()))?;
        registry.register(Box::new(user_downlink_bytes.clone()))?;
        registry.register(Box::new(user_traffic_bytes.clone()))?;
        registry.register(Box::new(last_update_success.clone()))?;
        registry.register(Box::new(last_blob_timestamp.clone()))?;

        Ok(Self {
            registry,
            server_id: server_id.to_string(),
            user_uplink_bytes,
            user_downlink_bytes,
            user_traffic_bytes,
            last_update_success,
            last_blob_timestamp,
        })
    }

    /// 用快照的绝对累计值替换当前计数器内容
    ///
    /// 溢出和时间戳越界在清空之前检查，这类失败不会改动任何计数器。
    pub fn reconcile(&self, snapshot: &Snapshot, snapshot_ref: &SnapshotRef) -> Result<(), RefreshError> {
        let timestamp = i64::try_from(snapshot_ref.timestamp()).map_err(|_| {
            RefreshError::Reconcile(format!("快照时间戳超出范围: {}", snapshot_ref.timestamp()))
        })?;

        let rows = snapshot
            .users
            .iter()
            .map(|(user, traffic)| {
                traffic
                    .total()
                    .map(|total| (user.as_str(), traffic.up, traffic.down, total))
                    .ok_or_else(|| RefreshError::Reconcile(format!("用户 {} 的总流量溢出", user)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 清空后重建：不在新快照中的用户不再导出
        self.user_uplink_bytes.reset();
        self.user_downlink_bytes.reset();
        self.user_traffic_bytes.reset();

        for (user, up, down, total) in rows {
            let labels = [self.server_id.as_str(), user];
            self.user_uplink_bytes.get_metric_with_label_values(&labels)?.inc_by(up);
            self.user_downlink_bytes.get_metric_with_label_values(&labels)?.inc_by(down);
            self.user_traffic_bytes.get_metric_with_label_values(&labels)?.inc_by(total);
        }

        self.last_blob_timestamp.set(timestamp);
        self.last_update_success.set(1);

        debug!("已按 {} 重建 {} 个用户的计数器", snapshot_ref, snapshot.len());
        Ok(())
    }

    pub fn mark_failure(&self) {
        self.last_update_success.set(0);
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.get() == 1
    }

    pub fn last_blob_timestamp(&self) -> i64 {
        self.last_blob_timestamp.get()
    }

    /// 某用户当前导出的 (上行, 下行, 合计)，没有该用户的序列时返回 None
    pub fn user_totals(&self, user: &str) -> Option<(u64, u64, u64)> {
        let read = |vec: &IntCounterVec| -> Option<u64> {
            let family = vec.collect().into_iter().next()?;
            family
                .get_metric()
                .iter()
                .find(|m| {
                    m.get_label()
                        .iter()
                        .any(|l| l.get_name() == "user" && l.get_value() == user)
                })
                .map(|m| m.get_counter().get_value() as u64)
        };

        Some((
            read(&self.user_uplink_bytes)?,
            read(&self.user_downlink_bytes)?,
            read(&self.user_traffic_bytes)?,
        ))
    }

    /// 当前导出了序列的用户数
    pub fn user_count(&self) -> usize {
        self.user_traffic_bytes
            .collect()
            .first()
            .map(|family| family.get_metric().len())
            .unwrap_or(0)
    }

    /// Prometheus文本格式
    pub fn encode(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserTraffic;

    fn snapshot(users: &[(&str, u64, u64)]) -> Snapshot {
        Snapshot {
            users: users
                .iter()
                .map(|(u, up, down)| (u.to_string(), UserTraffic::new(*up, *down)))
                .collect(),
        }
    }

    fn snapshot_ref(name: &str) -> SnapshotRef {
        SnapshotRef::parse(name).unwrap()
    }

    #[test]
    fn rebuild_drops_users_missing_from_new_snapshot() {
        let metrics = TrafficMetrics::new("server-01").unwrap();

        metrics
            .reconcile(&snapshot(&[("u1", 10, 20), ("u2", 5, 5)]), &snapshot_ref("server-01/100.json"))
            .unwrap();
        assert_eq!(metrics.user_totals("u1"), Some((10, 20, 30)));
        assert_eq!(metrics.user_totals("u2"), Some((5, 5, 10)));

        metrics
            .reconcile(&snapshot(&[("u1", 15, 25)]), &snapshot_ref("server-01/200.json"))
            .unwrap();
        assert_eq!(metrics.user_totals("u1"), Some((15, 25, 40)));
        assert_eq!(metrics.user_totals("u2"), None);
        assert_eq!(metrics.user_count(), 1);
        assert_eq!(metrics.last_blob_timestamp(), 200);
        assert!(metrics.last_update_success());

        let text = metrics.encode().unwrap();
        assert!(!text.contains("user=\"u2\""));
    }

    #[test]
    fn overflow_fails_before_touching_counters() {
        let metrics = TrafficMetrics::new("server-01").unwrap();
        metrics
            .reconcile(&snapshot(&[("u1", 1, 2)]), &snapshot_ref("server-01/100.json"))
            .unwrap();

        let err = metrics
            .reconcile(&snapshot(&[("u1", u64::MAX, 1)]), &snapshot_ref("server-01/200.json"))
            .unwrap_err();
        assert!(matches!(err, RefreshError::Reconcile(_)));
        assert_eq!(metrics.user_totals("u1"), Some((1, 2, 3)));
        assert_eq!(metrics.last_blob_timestamp(), 100);
    }

    #[test]
    fn empty_snapshot_clears_all_series() {
        let metrics = TrafficMetrics::new("server-01").unwrap();
        metrics
            .reconcile(&snapshot(&[("u1", 1, 2)]), &snapshot_ref("server-01/100.json"))
            .unwrap();
        metrics
            .reconcile(&Snapshot::default(), &snapshot_ref("server-01/200.json"))
            .unwrap();
        assert_eq!(metrics.user_count(), 0);
        assert!(metrics.last_update_success());
    }

    #[test]
    fn encodes_original_metric_names_and_labels() {
        let metrics = TrafficMetrics::new("server-01").unwrap();
        metrics
            .reconcile(&snapshot(&[("a@b.c", 3, 4)]), &snapshot_ref("server-01/1700000000.json"))
            .unwrap();

        let text = metrics.encode().unwrap();
        assert!(text.contains("xray_user_uplink_bytes_total{server_id=\"server-01\",user=\"a@b.c\"} 3"));
        assert!(text.contains("xray_user_downlink_bytes_total{server_id=\"server-01\",user=\"a@b.c\"} 4"));
        assert!(text.contains("xray_user_traffic_bytes_total{server_id=\"server-01\",user=\"a@b.c\"} 7"));
        assert!(text.contains("xray_last_update_success 1"));
        assert!(text.contains("xray_last_blob_timestamp_seconds 1700000000"));

        metrics.mark_failure();
        assert!(metrics.encode().unwrap().contains("xray_last_update_success 0"));
    }
}
