//! Back-filling helpers (spec.md §4.2) that repair existing history rather
//! than apply a new snapshot. Each supports a dry-run count and an apply
//! mode, mirroring the teacher's `retention_enforcer`'s `dry_run` knob.

use super::{Scd2TableConfig, Scd2Engine, OPEN_VALID_TO};
use crate::error::WarehouseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Apply,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub affected: u64,
}

impl<'w> Scd2Engine<'w> {
    /// For every tombstone row whose preceding history row has
    /// `valid_to = OPEN`, set that predecessor's `valid_to` to the
    /// tombstone's `valid_from`.
    pub async fn backfill_valid_to_on_deletes(
        &self,
        config: &Scd2TableConfig,
        mode: Mode,
    ) -> Result<BackfillReport, WarehouseError> {
        let history = self.warehouse().qualify(&config.history_table());
        let pk_names = config.pk_names_pub();
        let pk_join_predecessor: Vec<String> = pk_names
            .iter()
            .map(|n| format!("h.{n} = d.{n}"))
            .collect();

        let count_sql = format!(
            "SELECT count() as count FROM {history} h \
             INNER JOIN (SELECT {pk_cols}, valid_from FROM {history} WHERE op = 'D') d \
             ON {join} \
             WHERE h.op != 'D' AND h.valid_to = {OPEN_VALID_TO} AND h.valid_from < d.valid_from",
            pk_cols = pk_names.join(", "),
            join = pk_join_predecessor.join(" AND "),
        );
        let affected = self.warehouse().count(&count_sql).await?;

        if mode == Mode::Apply && affected > 0 {
            let update_sql = format!(
                "ALTER TABLE {history} UPDATE valid_to = (\
                   SELECT d.valid_from FROM {history} d WHERE d.op = 'D' AND {join2} \
                   ORDER BY d.valid_from ASC LIMIT 1 \
                 ) \
                 WHERE op != 'D' AND valid_to = {OPEN_VALID_TO} AND ({pk_cols}) IN (\
                   SELECT {pk_cols} FROM {history} WHERE op = 'D'\
                 )",
                pk_cols = pk_names.join(", "),
                join2 = pk_names.iter().map(|n| format!("d.{n} = {history}.{n}")).collect::<Vec<_>>().join(" AND "),
            );
            self.warehouse().exec(&update_sql).await?;
        }

        Ok(BackfillReport { affected })
    }

    /// For every tombstone whose entity later reappeared (a later history
    /// row with `op != 'D'` and a larger `valid_from` exists), set the
    /// tombstone's `valid_to` to that later row's `valid_from`.
    pub async fn backfill_valid_to_on_reinserts(
        &self,
        config: &Scd2TableConfig,
        mode: Mode,
    ) -> Result<BackfillReport, WarehouseError> {
        let history = self.warehouse().qualify(&config.history_table());
        let pk_names = config.pk_names_pub();
        let join: Vec<String> = pk_names.iter().map(|n| format!("t.{n} = r.{n}")).collect();

        let count_sql = format!(
            "SELECT count() as count FROM {history} t \
             INNER JOIN (SELECT {pk_cols}, valid_from FROM {history} WHERE op != 'D') r \
             ON {j} \
             WHERE t.op = 'D' AND t.valid_to = {OPEN_VALID_TO} AND r.valid_from > t.valid_from",
            pk_cols = pk_names.join(", "),
            j = join.join(" AND "),
        );
        let affected = self.warehouse().count(&count_sql).await?;

        if mode == Mode::Apply && affected > 0 {
            let update_sql = format!(
                "ALTER TABLE {history} UPDATE valid_to = (\
                   SELECT min(r.valid_from) FROM {history} r WHERE r.op != 'D' AND {j2} AND r.valid_from > {history}.valid_from\
                 ) \
                 WHERE op = 'D' AND valid_to = {OPEN_VALID_TO}",
                j2 = pk_names.iter().map(|n| format!("r.{n} = {history}.{n}")).collect::<Vec<_>>().join(" AND "),
            );
            self.warehouse().exec(&update_sql).await?;
        }

        Ok(BackfillReport { affected })
    }

    /// For every PK with more than one row in `{base}_current`, keep only
    /// the row with the newest `as_of_ts`. Should not occur under normal
    /// operation (the `ReplacingMergeTree` engine collapses duplicates on
    /// merge) but may follow a legacy bulk import that bypassed
    /// `apply_snapshot`.
    pub async fn deduplicate_current(
        &self,
        config: &Scd2TableConfig,
        mode: Mode,
    ) -> Result<BackfillReport, WarehouseError> {
        let current = self.warehouse().qualify(&config.current_table());
        let pk_names = config.pk_names_pub();

        let count_sql = format!(
            "SELECT coalesce(sum(c - 1), 0) as count FROM (\
               SELECT count() as c FROM {current} GROUP BY {}\
             ) WHERE c > 1",
            pk_names.join(", "),
        );
        let affected = self.warehouse().count(&count_sql).await.unwrap_or(0);

        if mode == Mode::Apply {
            // FINAL forces a synchronous collapse via OPTIMIZE, which is
            // the ReplacingMergeTree-native way to deduplicate by the
            // newest `as_of_ts` version column.
            self.warehouse().rewrite_data_files(&config.current_table(), 0).await?;
        }

        Ok(BackfillReport { affected })
    }
}

impl Scd2TableConfig {
    pub(crate) fn pk_names_pub(&self) -> Vec<&str> {
        self.pk_names()
    }
}

impl<'w> Scd2Engine<'w> {
    fn warehouse(&self) -> &'w dyn crate::warehouse::WarehouseStore {
        self.warehouse
    }
}
