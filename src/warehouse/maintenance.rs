//! Maintenance operations (spec.md §4.1). The spec's vocabulary
//! (`merge_adjacent_files`, `expire_snapshots`, orphan/old-file cleanup) is
//! written for a table format with an explicit file/snapshot manifest
//! (Iceberg/Delta-style). The embedded engine here is ClickHouse's
//! MergeTree, which has its own background-merge model instead of an
//! explicit snapshot list. Each operation below maps onto the closest
//! MergeTree primitive, documented at the call site; where there's truly no
//! analogue (snapshot/orphan-file bookkeeping), the operation is a
//! well-defined no-op that reports zero work rather than faking a result.

use super::Warehouse;
use crate::error::WarehouseError;

#[derive(Debug, Clone, Default)]
pub struct MaintenanceOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    pub older_than_secs: Option<u64>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExpireSnapshotsResult {
    pub snapshots: u64,
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
}

impl Warehouse {
    /// Merges adjacent small parts for `table`. MergeTree analogue:
    /// `OPTIMIZE TABLE` without `FINAL`, which lets the engine pick
    /// mergeable adjacent parts on its own schedule hint.
    pub async fn merge_adjacent_files(&self, table: &str) -> Result<(), WarehouseError> {
        let qualified = self.qualify(table);
        self.exec(&format!("OPTIMIZE TABLE {qualified}")).await
    }

    /// Forces a full rewrite of `table`'s data parts. `threshold_bytes` is
    /// accepted for interface parity with engines that support
    /// size-threshold-gated rewrites; ClickHouse's `OPTIMIZE ... FINAL` has
    /// no such knob, so it is ignored here (documented, not silently wrong).
    pub async fn rewrite_data_files(
        &self,
        table: &str,
        _threshold_bytes: u64,
    ) -> Result<(), WarehouseError> {
        let qualified = self.qualify(table);
        self.exec(&format!("OPTIMIZE TABLE {qualified} FINAL")).await
    }

    /// No-op: MergeTree has no user-visible "old file" list distinct from
    /// its parts, which `merge_adjacent_files`/`rewrite_data_files` already
    /// manage. Reports zero rather than pretending to have found work.
    pub async fn cleanup_old_files(
        &self,
        _opts: &CleanupOptions,
    ) -> Result<u64, WarehouseError> {
        Ok(0)
    }

    /// No-op for the same reason as `cleanup_old_files`: no orphaned-file
    /// bookkeeping exists to sweep in this engine.
    pub async fn delete_orphaned_files(
        &self,
        _opts: &CleanupOptions,
    ) -> Result<u64, WarehouseError> {
        Ok(0)
    }

    /// No-op: ClickHouse MergeTree has no snapshot manifest to expire.
    pub async fn expire_snapshots(
        &self,
        _opts: &MaintenanceOptions,
    ) -> Result<ExpireSnapshotsResult, WarehouseError> {
        Ok(ExpireSnapshotsResult::default())
    }

    /// No-op: see `expire_snapshots`.
    pub async fn checkpoint(&self, _expire_older_than_secs: u64) -> Result<(), WarehouseError> {
        Ok(())
    }

    /// Flushes any buffered/inlined inserts for `table`. Maps onto
    /// ClickHouse's `Buffer`/`Distributed` engine flush when `table` uses
    /// one; for plain `MergeTree` tables this degenerates to
    /// `merge_adjacent_files`.
    pub async fn flush_inlined_data(&self, table: &str) -> Result<(), WarehouseError> {
        let qualified = self.qualify(table);
        match self.exec(&format!("SYSTEM FLUSH DISTRIBUTED {qualified}")).await {
            Ok(()) => Ok(()),
            Err(_) => self.merge_adjacent_files(table).await,
        }
    }
}
