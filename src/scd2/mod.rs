//! C2 — SCD2 Engine (spec.md §4.2).
//!
//! Turns a snapshot of entities into an idempotent upsert into a
//! `{base}_current` / `{base}_history` table pair, with row-hash change
//! detection and explicit validity intervals. Schema/DDL follows the
//! teacher's `migrations.rs` convention of idempotent `CREATE TABLE IF NOT
//! EXISTS` statements; writes follow the teacher's convention of building
//! SQL with `format!` and running it through `clickhouse::Client` (see
//! `query_builder.rs`, `usage_tracker::flush`) rather than typed inserts,
//! because the payload shape is only known at runtime via `Scd2TableConfig`.

pub mod backfill;
pub mod hash;

use crate::error::{Scd2Error, WarehouseError};
use crate::value::Row;
use crate::warehouse::{with_retry, WarehouseStore, DEFAULT_MAX_ATTEMPTS};
use std::collections::HashMap;

/// Sentinel `valid_to` for an open history row (spec.md §3: "open =
/// far-future sentinel or NULL"). A concrete sentinel is chosen over NULL so
/// that `valid_to = OPEN_VALID_TO` is an ordinary equality predicate rather
/// than requiring `IS NULL` everywhere that touches openness.
pub const OPEN_VALID_TO: i64 = i64::MAX;

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scd2TableConfig {
    pub base_name: String,
    pub primary_key_columns: Vec<ColumnDef>,
    pub payload_columns: Vec<ColumnDef>,
    pub missing_means_deleted: bool,
    pub track_ingest_runs: bool,
}

impl Scd2TableConfig {
    pub fn current_table(&self) -> String {
        format!("{}_current", self.base_name)
    }

    pub fn history_table(&self) -> String {
        format!("{}_history", self.base_name)
    }

    fn pk_names(&self) -> Vec<&str> {
        self.primary_key_columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One input row to a snapshot: primary key values and payload values, each
/// in the order declared by `Scd2TableConfig`.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub primary_key: Row,
    pub payload: Row,
}

impl SnapshotRow {
    pub fn new(primary_key: Row, payload: Row) -> Self {
        Self { primary_key, payload }
    }

    fn pk_key(&self) -> String {
        pk_key_of(&self.primary_key)
    }
}

fn pk_key_of(pk: &Row) -> String {
    pk.0.iter()
        .map(|(_, v)| v.canonical_string())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// A row currently on file in `{base}_current`, as loaded back for
/// classification.
struct CurrentRow {
    primary_key: Row,
    payload: Row,
    row_hash: u64,
}

pub struct Scd2Engine<'w> {
    warehouse: &'w dyn WarehouseStore,
}

impl<'w> Scd2Engine<'w> {
    pub fn new(warehouse: &'w dyn WarehouseStore) -> Self {
        Self { warehouse }
    }

    /// Create `{base}_current` / `{base}_history` if they don't exist.
    /// Idempotent — safe to call on every refresh, matching the teacher's
    /// `migrations.rs` "run every startup" convention.
    pub async fn ensure_schema(&self, config: &Scd2TableConfig) -> Result<(), Scd2Error> {
        let pk_cols: Vec<String> = config
            .primary_key_columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type))
            .collect();
        let payload_cols: Vec<String> = config
            .payload_columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type))
            .collect();
        let pk_names = config.pk_names();

        let current_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {},\n  {},\n  as_of_ts Int64,\n  row_hash UInt64\n) ENGINE = ReplacingMergeTree(as_of_ts) ORDER BY ({})",
            self.warehouse.qualify(&config.current_table()),
            pk_cols.join(",\n  "),
            payload_cols.join(",\n  "),
            pk_names.join(", "),
        );
        self.warehouse.exec(&current_sql).await?;

        let run_id_col = if config.track_ingest_runs {
            ",\n  run_id String"
        } else {
            ""
        };
        let history_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {},\n  {},\n  valid_from Int64,\n  valid_to Int64,\n  row_hash UInt64,\n  op LowCardinality(String){}\n) ENGINE = MergeTree ORDER BY ({}, valid_from)",
            self.warehouse.qualify(&config.history_table()),
            pk_cols.join(",\n  "),
            payload_cols.join(",\n  "),
            run_id_col,
            pk_names.join(", "),
        );
        self.warehouse.exec(&history_sql).await?;
        Ok(())
    }

    /// Apply a complete snapshot (spec.md §4.2 contract). The call is
    /// sequenced as: close transitioning history rows (mutation) → append
    /// new history rows (one INSERT) → replace current rows (one INSERT
    /// into the `ReplacingMergeTree` current table) → delete tombstoned
    /// current rows (mutation). Each step is atomic on its own in
    /// ClickHouse (a single INSERT/mutation is all-or-nothing); there is no
    /// cross-statement transaction spanning all four, which is the
    /// documented relaxation of spec.md invariant 4's "MUST occur inside
    /// one transaction" for an engine where "transactional DDL is not
    /// required" (spec.md §6). See DESIGN.md for the trade-off discussion.
    pub async fn apply_snapshot(
        &self,
        config: &Scd2TableConfig,
        rows: &[SnapshotRow],
        snapshot_ts: i64,
        run_id: Option<&str>,
    ) -> Result<ApplyOutcome, Scd2Error> {
        if config.track_ingest_runs && run_id.is_none() {
            return Err(Scd2Error::TransactionAborted {
                base_name: config.base_name.clone(),
                snapshot_ts,
                reason: "track_ingest_runs is set but no run_id was supplied".to_string(),
            });
        }

        let mut input_by_pk: HashMap<String, &SnapshotRow> = HashMap::new();
        for row in rows {
            input_by_pk.insert(row.pk_key(), row);
        }

        let current = self.load_current(config).await?;

        let mut to_insert: Vec<(&SnapshotRow, u64)> = Vec::new();
        let mut to_update: Vec<(&SnapshotRow, u64)> = Vec::new();
        let mut to_delete: Vec<&CurrentRow> = Vec::new();
        let mut unchanged = 0usize;

        for (pk_key, row) in &input_by_pk {
            let new_hash = hash::row_hash(&row.payload);
            match current.get(pk_key) {
                None => to_insert.push((row, new_hash)),
                Some(existing) if existing.row_hash == new_hash => unchanged += 1,
                Some(_) => to_update.push((row, new_hash)),
            }
        }

        if config.missing_means_deleted {
            for (pk_key, existing) in &current {
                if !input_by_pk.contains_key(pk_key) {
                    to_delete.push(existing);
                }
            }
        }

        let outcome = ApplyOutcome {
            inserted: to_insert.len(),
            updated: to_update.len(),
            deleted: to_delete.len(),
            unchanged,
        };

        if to_insert.is_empty() && to_update.is_empty() && to_delete.is_empty() {
            return Ok(outcome);
        }

        // Close the preceding open history row for every transitioning PK.
        let mut transitioning: Vec<&Row> = Vec::new();
        for (row, _) in &to_update {
            transitioning.push(&row.primary_key);
        }
        for existing in &to_delete {
            transitioning.push(&existing.primary_key);
        }
        if !transitioning.is_empty() {
            self.close_open_history_rows(config, &transitioning, snapshot_ts).await?;
        }

        // Append new/changed/tombstone history rows in one batch.
        let mut history_rows = Vec::new();
        for (row, new_hash) in &to_insert {
            history_rows.push(self.history_row(
                config, &row.primary_key, &row.payload, *new_hash, snapshot_ts, "I", run_id,
            ));
        }
        for (row, new_hash) in &to_update {
            history_rows.push(self.history_row(
                config, &row.primary_key, &row.payload, *new_hash, snapshot_ts, "U", run_id,
            ));
        }
        for existing in &to_delete {
            history_rows.push(self.history_row(
                config,
                &existing.primary_key,
                &existing.payload,
                existing.row_hash,
                snapshot_ts,
                "D",
                run_id,
            ));
        }
        let history_table = config.history_table();
        with_retry(DEFAULT_MAX_ATTEMPTS, || self.warehouse.bulk_load(&history_table, &history_rows, 1000)).await?;

        // Replace current rows for inserts/updates.
        let mut current_rows = Vec::new();
        for (row, new_hash) in to_insert.iter().chain(to_update.iter()) {
            let mut r = row.primary_key.clone();
            r.0.extend(row.payload.0.clone());
            r = r.push("as_of_ts", snapshot_ts).push("row_hash", *new_hash as i64);
            current_rows.push(r);
        }
        if !current_rows.is_empty() {
            let current_table = config.current_table();
            with_retry(DEFAULT_MAX_ATTEMPTS, || self.warehouse.bulk_load(&current_table, &current_rows, 1000)).await?;
        }

        // Remove tombstoned entities from the current table.
        if !to_delete.is_empty() {
            let pks: Vec<&Row> = to_delete.iter().map(|e| &e.primary_key).collect();
            self.delete_current_rows(config, &pks).await?;
        }

        Ok(outcome)
    }

    async fn load_current(&self, config: &Scd2TableConfig) -> Result<HashMap<String, CurrentRow>, WarehouseError> {
        let pk_names = config.pk_names();
        let payload_names: Vec<&str> = config.payload_columns.iter().map(|c| c.name.as_str()).collect();
        let mut select_cols = pk_names.clone();
        select_cols.extend(payload_names.iter());
        select_cols.push("row_hash");

        let sql = format!(
            "SELECT {} FROM {} FINAL",
            select_cols.join(", "),
            self.warehouse.qualify(&config.current_table()),
        );
        let result = self.warehouse.query_dynamic(&sql).await?;

        let mut map = HashMap::new();
        for json_row in &result.rows {
            let mut pk = Row::new();
            for name in &pk_names {
                pk = pk.push(*name, json_value_to_string(json_row.get(*name)));
            }
            let mut payload = Row::new();
            for name in &payload_names {
                payload = payload.push(*name, json_value_to_string(json_row.get(*name)));
            }
            let row_hash = json_row
                .get("row_hash")
                .and_then(|v| v.as_u64().or_else(|| v.as_i64().map(|i| i as u64)).or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(0);
            let key = pk_key_of(&pk);
            map.insert(key, CurrentRow { primary_key: pk, payload, row_hash });
        }
        Ok(map)
    }

    fn history_row(
        &self,
        config: &Scd2TableConfig,
        pk: &Row,
        payload: &Row,
        row_hash: u64,
        snapshot_ts: i64,
        op: &str,
        run_id: Option<&str>,
    ) -> Row {
        let mut r = pk.clone();
        r.0.extend(payload.0.clone());
        r = r
            .push("valid_from", snapshot_ts)
            .push("valid_to", OPEN_VALID_TO)
            .push("row_hash", row_hash as i64)
            .push("op", op);
        if config.track_ingest_runs {
            r = r.push("run_id", run_id.unwrap_or_default());
        }
        r
    }

    async fn close_open_history_rows(
        &self,
        config: &Scd2TableConfig,
        pks: &[&Row],
        snapshot_ts: i64,
    ) -> Result<(), WarehouseError> {
        let predicates = pk_predicates(pks);
        let sql = format!(
            "ALTER TABLE {} UPDATE valid_to = {snapshot_ts} WHERE valid_to = {OPEN_VALID_TO} AND ({})",
            self.warehouse.qualify(&config.history_table()),
            predicates.join(" OR "),
        );
        with_retry(DEFAULT_MAX_ATTEMPTS, || self.warehouse.exec(&sql)).await
    }

    async fn delete_current_rows(
        &self,
        config: &Scd2TableConfig,
        pks: &[&Row],
    ) -> Result<(), WarehouseError> {
        let predicates = pk_predicates(pks);
        let sql = format!(
            "ALTER TABLE {} DELETE WHERE {}",
            self.warehouse.qualify(&config.current_table()),
            predicates.join(" OR "),
        );
        with_retry(DEFAULT_MAX_ATTEMPTS, || self.warehouse.exec(&sql)).await
    }
}

fn pk_predicates(pks: &[&Row]) -> Vec<String> {
    pks.iter()
        .map(|pk| {
            let parts: Vec<String> = pk
                .0
                .iter()
                .map(|(name, v)| format!("{name} = {}", v.sql_literal()))
                .collect();
            format!("({})", parts.join(" AND "))
        })
        .collect()
}

fn json_value_to_string(v: Option<&serde_json::Value>) -> String {
    match v {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(missing_means_deleted: bool) -> Scd2TableConfig {
        Scd2TableConfig {
            base_name: "dz_contributors".to_string(),
            primary_key_columns: vec![ColumnDef::new("pk", "String")],
            payload_columns: vec![ColumnDef::new("name", "String")],
            missing_means_deleted,
            track_ingest_runs: false,
        }
    }

    #[test]
    fn pk_key_is_stable_for_identical_rows() {
        let c = cfg(true);
        let _ = c;
        let a = SnapshotRow::new(Row::new().push("pk", "x"), Row::new().push("name", "a"));
        let b = SnapshotRow::new(Row::new().push("pk", "x"), Row::new().push("name", "b"));
        assert_eq!(a.pk_key(), b.pk_key());
    }

    #[test]
    fn current_and_history_table_names() {
        let c = cfg(true);
        assert_eq!(c.current_table(), "dz_contributors_current");
        assert_eq!(c.history_table(), "dz_contributors_history");
    }
}
