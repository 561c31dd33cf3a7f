//! C9 — Solana Snapshots View. Refreshes gossip nodes, vote accounts, and
//! leader schedule entries via the ledger RPC, applying each through C2 the
//! same way C5 drives the serviceability entities.

use crate::error::ViewError;
use crate::rpc::ledger::{flatten_leader_schedule, LedgerRpc};
use crate::scd2::{ApplyOutcome, ColumnDef, Scd2Engine, Scd2TableConfig};
use crate::warehouse::WarehouseStore;

fn gossip_nodes_config() -> Scd2TableConfig {
    Scd2TableConfig {
        base_name: "gossip_node".to_string(),
        primary_key_columns: vec![ColumnDef::new("pubkey", "String")],
        payload_columns: vec![
            ColumnDef::new("epoch", "Int64"),
            ColumnDef::new("version", "String"),
            ColumnDef::new("shred_version", "Int64"),
            ColumnDef::new("gossip_ip", "String"),
        ],
        missing_means_deleted: true,
        track_ingest_runs: false,
    }
}

fn vote_accounts_config() -> Scd2TableConfig {
    Scd2TableConfig {
        base_name: "vote_account".to_string(),
        primary_key_columns: vec![ColumnDef::new("pubkey", "String"), ColumnDef::new("epoch", "Int64")],
        payload_columns: vec![
            ColumnDef::new("node_pubkey", "String"),
            ColumnDef::new("activated_stake", "Int64"),
            ColumnDef::new("commission", "Int64"),
        ],
        missing_means_deleted: true,
        track_ingest_runs: false,
    }
}

fn leader_schedule_config() -> Scd2TableConfig {
    Scd2TableConfig {
        base_name: "leader_schedule".to_string(),
        primary_key_columns: vec![
            ColumnDef::new("pubkey", "String"),
            ColumnDef::new("epoch", "Int64"),
            ColumnDef::new("slot_index", "Int64"),
        ],
        payload_columns: vec![],
        missing_means_deleted: true,
        track_ingest_runs: false,
    }
}

pub struct SnapshotsView<'a> {
    warehouse: &'a dyn WarehouseStore,
    ledger: &'a dyn LedgerRpc,
    clock: &'a dyn Fn() -> i64,
}

#[derive(Debug, Default)]
pub struct SnapshotsRefreshReport {
    pub gossip_nodes: ApplyOutcome,
    pub vote_accounts: ApplyOutcome,
    pub leader_schedule: ApplyOutcome,
}

impl<'a> SnapshotsView<'a> {
    pub fn new(warehouse: &'a dyn WarehouseStore, ledger: &'a dyn LedgerRpc, clock: &'a dyn Fn() -> i64) -> Self {
        Self { warehouse, ledger, clock }
    }

    pub async fn refresh(&self) -> Result<SnapshotsRefreshReport, ViewError> {
        let epoch_info = self
            .ledger
            .get_epoch_info()
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?;
        let snapshot_ts = (self.clock)();
        let engine = Scd2Engine::new(self.warehouse);

        let gossip_cfg = gossip_nodes_config();
        engine.ensure_schema(&gossip_cfg).await?;
        let nodes = self
            .ledger
            .get_cluster_nodes()
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?;
        let node_rows: Vec<_> = nodes.iter().map(|n| n.to_snapshot_row()).collect();
        let gossip_nodes = engine.apply_snapshot(&gossip_cfg, &node_rows, snapshot_ts, None).await?;

        let vote_cfg = vote_accounts_config();
        engine.ensure_schema(&vote_cfg).await?;
        let votes = self
            .ledger
            .get_vote_accounts()
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?;
        let vote_rows: Vec<_> = votes.iter().map(|v| v.to_snapshot_row()).collect();
        let vote_accounts = engine.apply_snapshot(&vote_cfg, &vote_rows, snapshot_ts, None).await?;

        let schedule_cfg = leader_schedule_config();
        engine.ensure_schema(&schedule_cfg).await?;
        let schedule = self
            .ledger
            .get_leader_schedule(epoch_info.epoch)
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?;
        let entries = flatten_leader_schedule(epoch_info.epoch, &schedule);
        let entry_rows: Vec<_> = entries.iter().map(|e| e.to_snapshot_row()).collect();
        let leader_schedule = engine
            .apply_snapshot(&schedule_cfg, &entry_rows, snapshot_ts, None)
            .await?;

        Ok(SnapshotsRefreshReport {
            gossip_nodes,
            vote_accounts,
            leader_schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GossipNode, VoteAccount};
    use crate::rpc::ledger::mock::MockLedgerRpc;
    use crate::rpc::ledger::EpochInfo;
    use crate::warehouse::mock::MockWarehouse;
    use std::collections::HashMap;

    fn node(pubkey: &str) -> GossipNode {
        GossipNode {
            pubkey: pubkey.to_string(),
            epoch: 5,
            version: "1.18.0".to_string(),
            shred_version: 42,
            gossip_ip: "10.0.0.1".to_string(),
        }
    }

    fn vote_account(pubkey: &str) -> VoteAccount {
        VoteAccount {
            pubkey: pubkey.to_string(),
            epoch: 5,
            node_pubkey: "node1".to_string(),
            activated_stake: 1_000_000,
            commission: 5,
        }
    }

    #[tokio::test]
    async fn refresh_applies_all_three_dimensions_and_flattens_the_schedule() {
        let wh = MockWarehouse::new();
        let mut schedule = HashMap::new();
        schedule.insert("leader1".to_string(), vec![10, 11]);
        let ledger = MockLedgerRpc {
            epoch_info: Some(EpochInfo { epoch: 5, slot_index: 0, slots_in_epoch: 432_000 }),
            nodes: vec![node("n1")],
            vote_accounts: vec![vote_account("v1")],
            leader_schedule: schedule,
        };
        let clock = || 100i64;
        let view = SnapshotsView::new(&wh, &ledger, &clock);

        let report = view.refresh().await.unwrap();
        assert_eq!(report.gossip_nodes.inserted, 1);
        assert_eq!(report.vote_accounts.inserted, 1);
        // flatten_leader_schedule expands the one pubkey into 2 slot rows.
        assert_eq!(report.leader_schedule.inserted, 2);

        assert_eq!(wh.rows_of("gossip_node_current").len(), 1);
        assert_eq!(wh.rows_of("vote_account_current").len(), 1);
        assert_eq!(wh.rows_of("leader_schedule_current").len(), 2);
    }

    #[tokio::test]
    async fn second_refresh_with_empty_upstream_marks_everything_deleted() {
        let wh = MockWarehouse::new();
        let ledger = MockLedgerRpc {
            epoch_info: Some(EpochInfo { epoch: 5, slot_index: 0, slots_in_epoch: 432_000 }),
            nodes: vec![node("n1")],
            vote_accounts: vec![],
            leader_schedule: HashMap::new(),
        };
        let clock = || 100i64;
        let view = SnapshotsView::new(&wh, &ledger, &clock);
        view.refresh().await.unwrap();

        let ledger2 = MockLedgerRpc {
            epoch_info: Some(EpochInfo { epoch: 5, slot_index: 1, slots_in_epoch: 432_000 }),
            nodes: vec![],
            vote_accounts: vec![],
            leader_schedule: HashMap::new(),
        };
        let clock2 = || 200i64;
        let view2 = SnapshotsView::new(&wh, &ledger2, &clock2);
        let report = view2.refresh().await.unwrap();
        assert_eq!(report.gossip_nodes.deleted, 1);
        assert_eq!(wh.rows_of("gossip_node_current").len(), 0);
    }
}
