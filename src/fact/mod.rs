//! C3 — Fact Ingester (spec.md §4.3).
//!
//! Appends time-partitioned rows to `{name}_raw` fact tables and computes
//! the existing maximum sample index per logical stream so incremental
//! tail-fetchers (the latency view, C6) never re-read history. DDL follows
//! the teacher's `wide_events` table shape in `migrations.rs`: `MergeTree`,
//! partitioned by date parts of `time`, ordered by the logical key.

use crate::error::{FactError, WarehouseError};
use crate::value::Row;
use crate::warehouse::{with_retry, WarehouseStore, DEFAULT_MAX_ATTEMPTS};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FactTableConfig {
    pub name: String,
    pub columns: Vec<crate::scd2::ColumnDef>,
    /// Columns (in `time`'s ORDER BY tuple) used to partition by
    /// `(year, month, day)` of `time` when the engine supports it.
    /// Partition absence never affects correctness (spec.md §9).
    pub partition_by_time: bool,
    /// Logical key a re-ingestion must be idempotent on (spec.md §4.6 step
    /// 7). `None` keeps the default append-only `MergeTree ORDER BY time`;
    /// `Some(cols)` switches to `ReplacingMergeTree ORDER BY (cols)` so a
    /// re-inserted row for the same key collapses on merge instead of
    /// duplicating. Most fact tables (latency samples keyed by
    /// `sample_index`) are genuinely append-only and leave this `None`.
    pub upsert_key: Option<Vec<String>>,
}

impl FactTableConfig {
    pub fn table_name(&self) -> String {
        format!("{}_raw", self.name)
    }
}

pub struct FactIngester<'w> {
    warehouse: &'w dyn WarehouseStore,
}

impl<'w> FactIngester<'w> {
    pub fn new(warehouse: &'w dyn WarehouseStore) -> Self {
        Self { warehouse }
    }

    pub async fn ensure_schema(&self, config: &FactTableConfig) -> Result<(), FactError> {
        let cols: Vec<String> = config
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type))
            .collect();
        let partition = if config.partition_by_time {
            "PARTITION BY (toYear(time), toMonth(time), toDayOfMonth(time))\n"
        } else {
            ""
        };
        let (engine, order_by) = match &config.upsert_key {
            Some(key) => ("ReplacingMergeTree".to_string(), key.join(", ")),
            None => ("MergeTree".to_string(), "time".to_string()),
        };
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n) ENGINE = {}\n{}ORDER BY {}",
            self.warehouse.qualify(&config.table_name()),
            cols.join(",\n  "),
            engine,
            partition,
            order_by,
        );
        self.warehouse.exec(&sql).await?;
        Ok(())
    }

    /// Append rows via bulk insert. Fails atomically for the batch: a
    /// single `INSERT` statement in ClickHouse is all-or-nothing.
    pub async fn append(&self, config: &FactTableConfig, rows: &[Row]) -> Result<(), FactError> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = config.table_name();
        with_retry(DEFAULT_MAX_ATTEMPTS, || self.warehouse.bulk_load(&table, rows, 1000))
            .await
            .map_err(|e| match e {
                WarehouseError::Transient(msg) => FactError::BatchRejected {
                    table: config.table_name(),
                    reason: msg,
                },
                other => FactError::Warehouse(other),
            })?;
        Ok(())
    }

    /// Returns the current maximum `sample_index` grouped by the supplied
    /// key columns and `epoch`. Map key is `join(key_values, ":") + ":" +
    /// epoch`, matching spec.md §4.3.
    pub async fn max_sample_indices(
        &self,
        config: &FactTableConfig,
        key_columns: &[&str],
    ) -> Result<HashMap<String, i64>, FactError> {
        let mut select_cols: Vec<String> = key_columns.iter().map(|c| c.to_string()).collect();
        select_cols.push("epoch".to_string());
        select_cols.push("max(sample_index) as max_index".to_string());

        let sql = format!(
            "SELECT {} FROM {} GROUP BY {}, epoch",
            select_cols.join(", "),
            self.warehouse.qualify(&config.table_name()),
            key_columns.join(", "),
        );
        let result = self.warehouse.query_dynamic(&sql).await?;

        let mut map = HashMap::new();
        for row in &result.rows {
            let mut parts: Vec<String> = key_columns
                .iter()
                .map(|c| row.get(*c).map(json_to_plain_string).unwrap_or_default())
                .collect();
            let epoch = row.get("epoch").map(json_to_plain_string).unwrap_or_default();
            parts.push(epoch);
            let key = parts.join(":");
            let max_index: i64 = row
                .get("max_index")
                .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(-1);
            map.insert(key, max_index);
        }
        Ok(map)
    }
}

fn json_to_plain_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_adds_raw_suffix() {
        let c = FactTableConfig {
            name: "device_link_latency".to_string(),
            columns: vec![],
            partition_by_time: true,
            upsert_key: None,
        };
        assert_eq!(c.table_name(), "device_link_latency_raw");
    }
}
