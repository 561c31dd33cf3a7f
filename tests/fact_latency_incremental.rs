//! Scenario B (spec.md §8): an incremental device-link latency refresh
//! resumes from the previously stored `sample_index` instead of re-fetching
//! the whole tail.

use async_trait::async_trait;
use lakeview_core::config::LatencyViewConfig;
use lakeview_core::models::{GossipNode, VoteAccount};
use lakeview_core::rpc::ledger::{EpochInfo, LedgerRpc, LedgerRpcError};
use lakeview_core::rpc::telemetry::{
    DeviceLatencyTail, InternetLatencyTail, LatencyHeader, TelemetryRpc, TelemetryRpcError,
};
use lakeview_core::views::LatencyView;
use lakeview_core::warehouse::mock::MockWarehouse;
use std::collections::HashMap;
use tokio::sync::Mutex;

struct FixedEpochLedger {
    epoch: i64,
}

#[async_trait]
impl LedgerRpc for FixedEpochLedger {
    async fn get_epoch_info(&self) -> Result<EpochInfo, LedgerRpcError> {
        Ok(EpochInfo {
            epoch: self.epoch,
            slot_index: 0,
            slots_in_epoch: 432_000,
        })
    }

    async fn get_cluster_nodes(&self) -> Result<Vec<GossipNode>, LedgerRpcError> {
        Ok(Vec::new())
    }

    async fn get_vote_accounts(&self) -> Result<Vec<VoteAccount>, LedgerRpcError> {
        Ok(Vec::new())
    }

    async fn get_leader_schedule(&self, _epoch: i64) -> Result<HashMap<String, Vec<i64>>, LedgerRpcError> {
        Ok(HashMap::new())
    }
}

/// Hands back tails in the order queued, regardless of the link queried
/// (the test only ever drives a single link).
#[derive(Default)]
struct QueuedTelemetry {
    device_tails: Mutex<Vec<DeviceLatencyTail>>,
}

#[async_trait]
impl TelemetryRpc for QueuedTelemetry {
    async fn get_device_latency_tail(
        &self,
        _origin: &str,
        _target: &str,
        _link: &str,
        _epoch: i64,
        _existing_max_idx: i64,
    ) -> Result<DeviceLatencyTail, TelemetryRpcError> {
        let mut guard = self.device_tails.lock().await;
        if guard.is_empty() {
            return Err(TelemetryRpcError::AccountNotFound);
        }
        Ok(guard.remove(0))
    }

    async fn get_internet_latency_samples(
        &self,
        _provider: &str,
        _origin: &str,
        _target: &str,
        _agent: &str,
        _epoch: i64,
    ) -> Result<InternetLatencyTail, TelemetryRpcError> {
        Err(TelemetryRpcError::AccountNotFound)
    }
}

#[tokio::test]
async fn incremental_refresh_resumes_from_stored_sample_index() {
    let wh = MockWarehouse::new();
    let ledger = FixedEpochLedger { epoch: 7 };
    let telemetry = QueuedTelemetry::default();
    telemetry.device_tails.lock().await.push(DeviceLatencyTail {
        header: LatencyHeader {
            start_ts_us: 0,
            sample_interval_us: 1_000_000,
            next_sample_index: 3,
        },
        start_index_returned: 0,
        rtt_us: vec![5000, 6000, 7000],
    });
    let view = LatencyView::new(&wh, &ledger, &telemetry, LatencyViewConfig::default());
    let links = vec![("d1".to_string(), "d2".to_string(), "l1".to_string())];

    let report = view.refresh(&links, &[]).await.unwrap();
    assert_eq!(report.rows_appended, 3);
    let stored = wh.rows_of("device_link_latency_raw");
    assert_eq!(stored.len(), 3);
    let max_index = stored
        .iter()
        .filter_map(|r| r.get("sample_index").map(|v| v.sql_literal().parse::<i64>().unwrap()))
        .max()
        .unwrap();
    assert_eq!(max_index, 2);

    telemetry.device_tails.lock().await.push(DeviceLatencyTail {
        header: LatencyHeader {
            start_ts_us: 0,
            sample_interval_us: 1_000_000,
            next_sample_index: 5,
        },
        start_index_returned: 3,
        rtt_us: vec![8000, 9000],
    });
    let report = view.refresh(&links, &[]).await.unwrap();
    assert_eq!(report.rows_appended, 2);
    let stored = wh.rows_of("device_link_latency_raw");
    assert_eq!(stored.len(), 5);
    let mut indices: Vec<i64> = stored
        .iter()
        .filter_map(|r| r.get("sample_index").map(|v| v.sql_literal().parse::<i64>().unwrap()))
        .collect();
    indices.sort();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    // The original row at index 0 is untouched by the second refresh.
    let row0 = stored.iter().find(|r| r.get("sample_index").unwrap().sql_literal() == "0").unwrap();
    assert_eq!(row0.get("rtt_us").unwrap().sql_literal(), "5000");
}

#[tokio::test]
async fn failed_tail_fetch_is_skipped_without_failing_the_refresh() {
    let wh = MockWarehouse::new();
    let ledger = FixedEpochLedger { epoch: 1 };
    let telemetry = QueuedTelemetry::default();
    let view = LatencyView::new(&wh, &ledger, &telemetry, LatencyViewConfig::default());
    let links = vec![("d1".to_string(), "d2".to_string(), "l1".to_string())];

    let report = view.refresh(&links, &[]).await.unwrap();
    assert_eq!(report.rows_appended, 0);
    assert_eq!(report.keys_failed, 1);
}
