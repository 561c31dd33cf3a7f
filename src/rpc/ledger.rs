//! Ledger RPC (spec.md §6): Solana-side cluster state used to refresh the
//! gossip/vote/leader-schedule dimensions.

use crate::models::{GossipNode, LeaderScheduleEntry, VoteAccount};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerRpcError {
    #[error("ledger transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct EpochInfo {
    pub epoch: i64,
    pub slot_index: i64,
    pub slots_in_epoch: i64,
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_epoch_info(&self) -> Result<EpochInfo, LedgerRpcError>;
    async fn get_cluster_nodes(&self) -> Result<Vec<GossipNode>, LedgerRpcError>;
    async fn get_vote_accounts(&self) -> Result<Vec<VoteAccount>, LedgerRpcError>;
    async fn get_leader_schedule(
        &self,
        epoch: i64,
    ) -> Result<HashMap<String, Vec<i64>>, LedgerRpcError>;
}

/// Flattens the `pubkey -> slots[]` map returned by `get_leader_schedule`
/// into individual entity rows, matching the `LeaderScheduleEntry` PK shape
/// in `models::entities` (`pubkey`, `epoch`, `slot_index`).
pub fn flatten_leader_schedule(
    epoch: i64,
    schedule: &HashMap<String, Vec<i64>>,
) -> Vec<LeaderScheduleEntry> {
    let mut entries = Vec::new();
    for (pubkey, slots) in schedule {
        for &slot_index in slots {
            entries.push(LeaderScheduleEntry {
                pubkey: pubkey.clone(),
                epoch,
                slot_index,
            });
        }
    }
    entries
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_leader_schedule_expands_each_slot() {
        let mut schedule = HashMap::new();
        schedule.insert("pk1".to_string(), vec![10, 11, 12]);
        let entries = flatten_leader_schedule(5, &schedule);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.pubkey == "pk1" && e.epoch == 5));
    }
}
