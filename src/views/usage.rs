//! C7 — Usage View (spec.md §4.6). The trickiest view: sparse counters get
//! forward-filled and baselined from history, dense counters establish an
//! in-memory baseline on first sight and are never emitted for that first
//! row, and the whole thing upserts on `(time, device_pk, intf)` so a
//! 5-minute overlap window stays idempotent.

use crate::config::UsageViewConfig;
use crate::error::ViewError;
use crate::fact::{FactIngester, FactTableConfig};
use crate::models::{InterfaceUsage, LinkSide};
use crate::rpc::timeseries::{RawCounterRow, TimeSeriesSource};
use crate::scd2::ColumnDef;
use crate::warehouse::WarehouseStore;
use std::collections::HashMap;
use std::time::Duration;

/// Indices into the 16-counter array classified as "sparse" (spec.md §4.6
/// step 2): forward-filled from the last known value, baseline is a single
/// warehouse/upstream lookup rather than an in-memory first-row swallow.
pub const SPARSE_COUNTER_INDICES: [usize; 5] = [0, 1, 2, 3, 4];

pub fn usage_table() -> FactTableConfig {
    let mut columns = vec![
        ColumnDef::new("time", "Int64"),
        ColumnDef::new("device_pk", "String"),
        ColumnDef::new("intf", "String"),
        ColumnDef::new("link_pk", "Nullable(String)"),
        ColumnDef::new("link_side", "Nullable(String)"),
        ColumnDef::new("user_tunnel_id", "Nullable(Int64)"),
        ColumnDef::new("delta_duration_secs", "Nullable(Float64)"),
    ];
    for i in 0..16 {
        columns.push(ColumnDef::new(format!("counter_{i}"), "Nullable(Int64)"));
        columns.push(ColumnDef::new(format!("delta_{i}"), "Nullable(Int64)"));
    }
    FactTableConfig {
        name: "usage".to_string(),
        columns,
        partition_by_time: true,
        upsert_key: Some(vec!["time".to_string(), "device_pk".to_string(), "intf".to_string()]),
    }
}

pub struct LinkMembership {
    pub device_pk: String,
    pub intf: String,
    pub link_pk: String,
    pub side: LinkSide,
}

pub struct UsageView<'a> {
    warehouse: &'a dyn WarehouseStore,
    source: &'a dyn TimeSeriesSource,
    config: UsageViewConfig,
}

#[derive(Debug, Default)]
pub struct UsageRefreshReport {
    pub rows_upserted: usize,
    pub baseline_keys: usize,
}

impl<'a> UsageView<'a> {
    pub fn new(warehouse: &'a dyn WarehouseStore, source: &'a dyn TimeSeriesSource, config: UsageViewConfig) -> Self {
        Self {
            warehouse,
            source,
            config,
        }
    }

    pub async fn refresh(&self, now: i64, links: &[LinkMembership]) -> Result<UsageRefreshReport, ViewError> {
        let table = usage_table();
        let ingester = FactIngester::new(self.warehouse);
        ingester.ensure_schema(&table).await?;

        let window_start = self.determine_window_start(&table, now).await?;
        let sparse_baseline = self.load_sparse_baseline(&table, window_start).await?;
        let raw_rows = self
            .source
            .query_range(window_start, now)
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?;

        let membership: HashMap<(String, String), (String, LinkSide)> = links
            .iter()
            .map(|m| ((m.device_pk.clone(), m.intf.clone()), (m.link_pk.clone(), m.side)))
            .collect();

        let mut by_key: HashMap<(String, String), Vec<RawCounterRow>> = HashMap::new();
        for row in raw_rows {
            by_key.entry((row.device_pk.clone(), row.intf.clone())).or_default().push(row);
        }

        let mut output_rows = Vec::new();
        let mut baseline_keys = 0;
        for ((device_pk, intf), mut rows) in by_key {
            rows.sort_by_key(|r| r.time);

            let mut last_values: [Option<i64>; 16] =
                *sparse_baseline.get(&(device_pk.clone(), intf.clone())).unwrap_or(&[None; 16]);
            let mut dense_baseline_set = false;
            let mut last_time: Option<i64> = None;

            for raw in rows {
                let mut merged = raw.counters;
                for &i in SPARSE_COUNTER_INDICES.iter() {
                    if merged[i].is_none() {
                        merged[i] = last_values[i];
                    }
                }
                for i in 0..16 {
                    if !SPARSE_COUNTER_INDICES.contains(&i) && merged[i].is_none() {
                        merged[i] = last_values[i];
                    }
                }

                let is_first_dense_observation = !dense_baseline_set;
                if is_first_dense_observation {
                    dense_baseline_set = true;
                    baseline_keys += 1;
                    last_values = merged;
                    last_time = Some(raw.time);
                    // Dense baseline swallow: the first-ever row is recorded
                    // but not emitted (spec.md §4.6 step 6, §8 property 8).
                    continue;
                }

                let mut deltas = [None; 16];
                for i in 0..16 {
                    deltas[i] = match (merged[i], last_values[i]) {
                        (Some(cur), Some(prev)) if cur >= prev => Some(cur - prev),
                        _ => None,
                    };
                }
                let delta_duration_secs = last_time.map(|t| (raw.time - t).max(0) as f64);

                let (link_pk, link_side) = membership
                    .get(&(device_pk.clone(), intf.clone()))
                    .map(|(pk, side)| (Some(pk.clone()), Some(side.as_str().to_string())))
                    .unwrap_or((None, None));

                output_rows.push(InterfaceUsage {
                    time: raw.time,
                    device_pk: device_pk.clone(),
                    intf: intf.clone(),
                    link_pk,
                    link_side,
                    delta_duration_secs,
                    counters: merged.map(|v| v.unwrap_or_default()),
                    deltas,
                });

                last_values = merged;
                last_time = Some(raw.time);
            }
        }

        let rows_upserted = output_rows.len();
        let value_rows: Vec<_> = output_rows
            .iter()
            .map(|r| r.to_row().push("user_tunnel_id", extract_tunnel_id(&r.intf)))
            .collect();
        // Upsert semantics: the underlying table is a ReplacingMergeTree
        // keyed on (device_pk, intf, time); re-inserting the same logical
        // key is idempotent once merges collapse duplicates.
        ingester.append(&table, &value_rows).await?;

        Ok(UsageRefreshReport {
            rows_upserted,
            baseline_keys,
        })
    }

    async fn determine_window_start(&self, table: &FactTableConfig, now: i64) -> Result<i64, ViewError> {
        let qualified = self.warehouse.qualify(&table.table_name());
        let max_time = self
            .warehouse
            .query_dynamic(&format!("SELECT max(time) as max_time FROM {qualified}"))
            .await
            .ok()
            .and_then(|r| r.rows.first().cloned())
            .and_then(|row| row.get("max_time").and_then(|v| v.as_i64()));

        let query_window = self.config.query_window().as_secs() as i64;
        let overlap = self.config.overlap().as_secs() as i64;

        Ok(match max_time {
            None => now - query_window,
            Some(t) if t > now - query_window => t - overlap,
            Some(_) => now - query_window,
        })
    }

    /// Loads the most recent non-null sparse-counter values strictly before
    /// `window_start`. Falls back to the upstream time-series source with a
    /// long lookback if the warehouse has nothing (e.g. first run, or the
    /// retention window already dropped the relevant rows).
    async fn load_sparse_baseline(
        &self,
        table: &FactTableConfig,
        window_start: i64,
    ) -> Result<HashMap<(String, String), [Option<i64>; 16]>, ViewError> {
        let qualified = self.warehouse.qualify(&table.table_name());
        let select_cols: Vec<String> = SPARSE_COUNTER_INDICES
            .iter()
            .map(|i| format!("argMax(counter_{i}, time) as counter_{i}"))
            .collect();
        let sql = format!(
            "SELECT device_pk, intf, {} FROM {qualified} WHERE time < {window_start} GROUP BY device_pk, intf",
            select_cols.join(", "),
        );

        let mut baseline = HashMap::new();
        if let Ok(result) = self.warehouse.query_dynamic(&sql).await {
            for row in &result.rows {
                let device_pk = row.get("device_pk").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let intf = row.get("intf").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let mut values = [None; 16];
                for &i in SPARSE_COUNTER_INDICES.iter() {
                    values[i] = row.get(&format!("counter_{i}")).and_then(|v| v.as_i64());
                }
                baseline.insert((device_pk, intf), values);
            }
        }

        if baseline.is_empty() {
            let deadline = Duration::from_secs(self.config.baseline_deadline_secs);
            let lookback = self.config.baseline_lookback_secs as i64;
            match tokio::time::timeout(deadline, self.source.last_known_before(window_start, lookback)).await {
                Ok(Ok(rows)) => {
                    for row in rows {
                        baseline.insert((row.device_pk, row.intf), row.counters);
                    }
                }
                // Degraded-but-correct per spec.md §5: on expiry or error,
                // proceed with empty baselines; the first row becomes the
                // effective baseline.
                _ => {}
            }
        }

        Ok(baseline)
    }
}

/// Extracts the trailing integer from a `"TunnelNNN"`-shaped interface name
/// (spec.md §4.6 step 6).
fn extract_tunnel_id(intf: &str) -> Option<i64> {
    intf.strip_prefix("Tunnel").and_then(|rest| rest.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tunnel_id_parses_trailing_digits() {
        assert_eq!(extract_tunnel_id("Tunnel42"), Some(42));
        assert_eq!(extract_tunnel_id("GigabitEthernet0/0/1"), None);
    }

    #[test]
    fn usage_table_has_32_counter_columns() {
        let t = usage_table();
        let counter_cols = t.columns.iter().filter(|c| c.name.starts_with("counter_") || c.name.starts_with("delta_")).count();
        assert_eq!(counter_cols, 32);
    }
}
