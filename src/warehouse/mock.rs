//! In-memory `WarehouseStore` for tests (spec.md §8 scenarios A/B/C).
//! Unlike `rpc::*::mock`, this module is NOT `#[cfg(test)]`-gated: a
//! separate `tests/` integration binary links against this library built
//! *without* `--cfg test`, so a mock that needs to be visible there has to
//! be an ordinary public item.
//!
//! Recognizes exactly the handful of SQL shapes `scd2`, `fact`, and
//! `views::usage` ever generate (`format!`-built strings, never a general
//! SQL grammar) and keeps per-table rows in memory. Tables declared
//! `ENGINE = ReplacingMergeTree` are upserted on write by the primary-key
//! columns recovered from their own `CREATE TABLE ... ORDER BY (...)`
//! statement, which reproduces what a real `SELECT ... FINAL` over a
//! `ReplacingMergeTree` would return without having to simulate background
//! merges at read time. Plain `MergeTree` tables (history, latency/usage
//! samples without an upsert key) are append-only.

use super::{QueryResult, WarehouseStore};
use crate::error::WarehouseError;
use crate::value::{Row, Value};
use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockWarehouse {
    database: String,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    pk_cols: Mutex<HashMap<String, Vec<String>>>,
    replacing_tables: Mutex<HashSet<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            database: "mockdb".to_string(),
            tables: Mutex::new(HashMap::new()),
            pk_cols: Mutex::new(HashMap::new()),
            replacing_tables: Mutex::new(HashSet::new()),
        }
    }

    /// Snapshot of a table's rows, keyed by the already-qualified name this
    /// mock stores internally (`{database}.{table}`). Lets a test assert on
    /// what actually landed without going through `query_dynamic`.
    pub fn rows_of(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(&self.qualify(table))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WarehouseStore for MockWarehouse {
    fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.database, table)
    }

    async fn exec(&self, sql: &str) -> Result<(), WarehouseError> {
        let sql = sql.trim();
        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            let table = extract_create_table_name(sql);
            let pk_cols = parse_order_by_pk_cols(sql);
            self.tables.lock().unwrap().entry(table.clone()).or_default();
            if sql.contains("ENGINE = ReplacingMergeTree") {
                self.replacing_tables.lock().unwrap().insert(table.clone());
            }
            if !pk_cols.is_empty() {
                self.pk_cols.lock().unwrap().insert(table, pk_cols);
            }
            return Ok(());
        }
        if sql.starts_with("OPTIMIZE TABLE") {
            return Ok(());
        }
        if sql.contains("SELECT min(r.valid_from)") {
            self.apply_reinsert_backfill(sql);
            return Ok(());
        }
        if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let table_end = rest
                .find(' ')
                .ok_or_else(|| WarehouseError::Transient(format!("mock: malformed ALTER TABLE: {sql}")))?;
            let table = rest[..table_end].to_string();
            let after_table = rest[table_end..].trim_start();

            if let Some(upd) = after_table.strip_prefix("UPDATE valid_to = ") {
                let where_idx = upd
                    .find(" WHERE ")
                    .ok_or_else(|| WarehouseError::Transient(format!("mock: malformed ALTER TABLE UPDATE: {sql}")))?;
                let new_valid_to: i64 = upd[..where_idx].trim().parse().map_err(|_| {
                    WarehouseError::Transient(format!("mock: non-numeric valid_to literal in: {sql}"))
                })?;
                let clause = &upd[where_idx + " WHERE ".len()..];
                let pk_cols = self.pk_cols.lock().unwrap().get(&table).cloned().unwrap_or_default();
                if let Some(rows) = self.tables.lock().unwrap().get_mut(&table) {
                    for row in rows.iter_mut() {
                        let is_open = row
                            .get("valid_to")
                            .map(|v| v.sql_literal() == crate::scd2::OPEN_VALID_TO.to_string())
                            .unwrap_or(false);
                        if is_open && row_matches_predicate_clause(row, &pk_cols, clause) {
                            set_column(row, "valid_to", Value::I64(new_valid_to));
                        }
                    }
                }
                return Ok(());
            }

            if let Some(clause) = after_table.strip_prefix("DELETE WHERE ") {
                let pk_cols = self.pk_cols.lock().unwrap().get(&table).cloned().unwrap_or_default();
                if let Some(rows) = self.tables.lock().unwrap().get_mut(&table) {
                    rows.retain(|row| !row_matches_predicate_clause(row, &pk_cols, clause));
                }
                return Ok(());
            }
        }
        Err(WarehouseError::Transient(format!("mock: unsupported exec sql: {sql}")))
    }

    async fn bulk_load(&self, table: &str, rows: &[Row], _chunk_size: usize) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }
        let qualified = self.qualify(table);
        let is_replacing = self.replacing_tables.lock().unwrap().contains(&qualified);
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(qualified.clone()).or_default();
        if is_replacing {
            let pk_cols = self.pk_cols.lock().unwrap().get(&qualified).cloned().unwrap_or_default();
            for row in rows {
                let existing = entry
                    .iter_mut()
                    .find(|r| pk_cols.iter().all(|c| r.get(c) == row.get(c)));
                match existing {
                    Some(slot) => *slot = row.clone(),
                    None => entry.push(row.clone()),
                }
            }
        } else {
            entry.extend(rows.iter().cloned());
        }
        Ok(())
    }

    async fn query_dynamic(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let sql = sql.trim();
        if sql.contains(" FINAL") {
            return Ok(self.select_final(sql));
        }
        if sql.starts_with("SELECT DISTINCT ") {
            return Ok(self.select_distinct(sql));
        }
        if sql.contains("max(sample_index)") {
            return Ok(self.select_max_sample_indices(sql));
        }
        if sql.contains("argMax(") {
            return Ok(self.select_arg_max_baseline(sql));
        }
        if sql.starts_with("SELECT max(time)") {
            return Ok(self.select_max_time(sql));
        }
        Err(WarehouseError::Transient(format!("mock: unsupported query_dynamic sql: {sql}")))
    }

    async fn count(&self, sql: &str) -> Result<u64, WarehouseError> {
        if sql.contains("r.valid_from > t.valid_from") {
            return Ok(self.count_pending_reinsert_backfills(sql));
        }
        if let Some(rest) = sql.trim().strip_prefix("SELECT count() as count FROM ") {
            let table = rest.split_whitespace().next().unwrap_or("").to_string();
            return Ok(self.tables.lock().unwrap().get(&table).map(|r| r.len()).unwrap_or(0) as u64);
        }
        Err(WarehouseError::Transient(format!("mock: unsupported count sql: {sql}")))
    }

    async fn rewrite_data_files(&self, _table: &str, _threshold_bytes: u64) -> Result<(), WarehouseError> {
        Ok(())
    }
}

impl MockWarehouse {
    fn select_final(&self, sql: &str) -> QueryResult {
        let select_cols = parse_select_cols(sql);
        let table = extract_from_table(sql, " FINAL");
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();
        rows_to_result(&rows, &select_cols)
    }

    fn select_distinct(&self, sql: &str) -> QueryResult {
        let rest = sql.strip_prefix("SELECT DISTINCT ").unwrap_or(sql);
        let from_idx = rest.find(" FROM ").unwrap_or(rest.len());
        let col = rest[..from_idx].trim().to_string();
        let table = extract_from_table(sql, " WHERE");
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();

        let where_clause = sql.split(" WHERE ").nth(1);
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in &rows {
            if let Some(clause) = where_clause {
                if !row_matches_simple_where(row, clause) {
                    continue;
                }
            }
            if let Some(v) = row.get(&col) {
                let s = v.sql_literal();
                if seen.insert(s) {
                    let mut map = Map::new();
                    map.insert(col.clone(), value_to_json(v));
                    out.push(map);
                }
            }
        }
        QueryResult {
            columns: vec![col],
            column_types: vec![],
            count: out.len(),
            rows: out,
            read_only_enforced: true,
        }
    }

    fn select_max_sample_indices(&self, sql: &str) -> QueryResult {
        let select_cols = parse_select_cols(sql);
        // Last two select items are always "epoch" and "max(sample_index) as max_index".
        let key_cols: Vec<String> = select_cols[..select_cols.len().saturating_sub(2)].to_vec();
        let table = extract_from_table(sql, " GROUP BY");
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();

        let mut groups: HashMap<Vec<String>, i64> = HashMap::new();
        for row in &rows {
            let mut key: Vec<String> = key_cols.iter().map(|c| col_string(row, c)).collect();
            key.push(col_string(row, "epoch"));
            let sample_index = row.get("sample_index").map(|v| v.sql_literal()).and_then(|s| s.parse::<i64>().ok()).unwrap_or(-1);
            groups
                .entry(key)
                .and_modify(|m| *m = (*m).max(sample_index))
                .or_insert(sample_index);
        }

        let mut out = Vec::new();
        for (key, max_index) in groups {
            let mut map = Map::new();
            for (i, col) in key_cols.iter().enumerate() {
                map.insert(col.clone(), Json::String(key[i].clone()));
            }
            map.insert("epoch".to_string(), Json::String(key[key_cols.len()].clone()));
            map.insert("max_index".to_string(), Json::Number(max_index.into()));
            out.push(map);
        }
        QueryResult {
            columns: select_cols,
            column_types: vec![],
            count: out.len(),
            rows: out,
            read_only_enforced: true,
        }
    }

    fn select_arg_max_baseline(&self, sql: &str) -> QueryResult {
        let select_cols = parse_select_cols(sql);
        let counter_cols: Vec<String> = select_cols
            .iter()
            .filter(|c| c.starts_with("counter_"))
            .cloned()
            .collect();
        let table = extract_from_table(sql, " WHERE");
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();
        let window_start: i64 = sql
            .split("time < ")
            .nth(1)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(i64::MAX);

        let mut groups: HashMap<(String, String), (i64, Row)> = HashMap::new();
        for row in &rows {
            let time: i64 = row.get("time").map(|v| v.sql_literal()).and_then(|s| s.parse().ok()).unwrap_or(i64::MIN);
            if time >= window_start {
                continue;
            }
            let key = (col_string(row, "device_pk"), col_string(row, "intf"));
            groups
                .entry(key)
                .and_modify(|(best_time, best_row)| {
                    if time > *best_time {
                        *best_time = time;
                        *best_row = row.clone();
                    }
                })
                .or_insert((time, row.clone()));
        }

        let mut out = Vec::new();
        for ((device_pk, intf), (_, row)) in groups {
            let mut map = Map::new();
            map.insert("device_pk".to_string(), Json::String(device_pk));
            map.insert("intf".to_string(), Json::String(intf));
            for col in &counter_cols {
                let v = row.get(col).cloned().unwrap_or(Value::Null);
                map.insert(col.clone(), value_to_json(&v));
            }
            out.push(map);
        }
        QueryResult {
            columns: select_cols,
            column_types: vec![],
            count: out.len(),
            rows: out,
            read_only_enforced: true,
        }
    }

    /// `backfill_valid_to_on_reinserts`'s count query (spec.md §4.2
    /// backfill): for every open tombstone row, is there a later non-delete
    /// row for the same primary key? Implements the JOIN's intent directly
    /// on the in-memory rows rather than recognizing the JOIN syntax.
    fn count_pending_reinsert_backfills(&self, sql: &str) -> u64 {
        let table = extract_from_table(sql, "");
        let pk_cols = self.pk_cols.lock().unwrap().get(&table).cloned().unwrap_or_default();
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();
        rows.iter().filter(|row| is_open_tombstone(row) && later_reinsert(&rows, &pk_cols, row).is_some()).count() as u64
    }

    /// Applies `backfill_valid_to_on_reinserts`: closes each open tombstone
    /// at the `valid_from` of its earliest later non-delete row.
    fn apply_reinsert_backfill(&self, sql: &str) {
        let table = extract_from_table(sql, "");
        let pk_cols = self.pk_cols.lock().unwrap().get(&table).cloned().unwrap_or_default();
        let Some(rows) = self.tables.lock().unwrap().get(&table).cloned() else { return };
        let new_valid_tos: Vec<(usize, i64)> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                if !is_open_tombstone(row) {
                    return None;
                }
                later_reinsert(&rows, &pk_cols, row).map(|valid_from| (i, valid_from))
            })
            .collect();
        if let Some(stored) = self.tables.lock().unwrap().get_mut(&table) {
            for (i, valid_from) in new_valid_tos {
                set_column(&mut stored[i], "valid_to", Value::I64(valid_from));
            }
        }
    }

    fn select_max_time(&self, sql: &str) -> QueryResult {
        let table = extract_from_table(sql, "");
        let rows = self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default();
        let max_time = rows
            .iter()
            .filter_map(|r| r.get("time").map(|v| v.sql_literal()).and_then(|s| s.parse::<i64>().ok()))
            .max();
        let out = match max_time {
            Some(t) => {
                let mut map = Map::new();
                map.insert("max_time".to_string(), Json::Number(t.into()));
                vec![map]
            }
            None => vec![],
        };
        QueryResult {
            columns: vec!["max_time".to_string()],
            column_types: vec![],
            count: out.len(),
            rows: out,
            read_only_enforced: true,
        }
    }
}

fn col_string(row: &Row, col: &str) -> String {
    row.get(col).map(|v| match v {
        Value::Str(s) => s.clone(),
        other => other.sql_literal(),
    }).unwrap_or_default()
}

fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::I64(i) => Json::Number((*i).into()),
        Value::F64(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.clone()),
    }
}

fn rows_to_result(rows: &[Row], select_cols: &[String]) -> QueryResult {
    let out: Vec<Map<String, Json>> = rows
        .iter()
        .map(|row| {
            let mut map = Map::new();
            for col in select_cols {
                let v = row.get(col).cloned().unwrap_or(Value::Null);
                map.insert(col.clone(), value_to_json(&v));
            }
            map
        })
        .collect();
    QueryResult {
        columns: select_cols.to_vec(),
        column_types: vec![],
        count: out.len(),
        rows: out,
        read_only_enforced: true,
    }
}

/// Splits the column/expression list between `SELECT ` and ` FROM `.
fn parse_select_cols(sql: &str) -> Vec<String> {
    let rest = sql.strip_prefix("SELECT ").unwrap_or(sql);
    let from_idx = rest.find(" FROM ").unwrap_or(rest.len());
    rest[..from_idx].split(", ").map(|s| s.trim().to_string()).collect()
}

/// Extracts the table name between ` FROM ` and the next clause keyword
/// (passed as `stop`, e.g. `" FINAL"`/`" WHERE"`/`" GROUP BY"`; empty means
/// "rest of string").
fn extract_from_table(sql: &str, stop: &str) -> String {
    let after_from = sql.split(" FROM ").nth(1).unwrap_or("");
    let end = if stop.is_empty() {
        after_from.find(' ').unwrap_or(after_from.len())
    } else {
        after_from.find(stop).unwrap_or_else(|| after_from.find(' ').unwrap_or(after_from.len()))
    };
    after_from[..end].trim().to_string()
}

fn extract_create_table_name(sql: &str) -> String {
    let rest = sql.strip_prefix("CREATE TABLE IF NOT EXISTS ").unwrap_or(sql);
    let end = rest.find(|c: char| c == ' ' || c == '(').unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Recovers the primary-key column list from a `... ORDER BY (col1, col2, ...)`
/// tail, stripping the trailing `valid_from` that history tables append.
fn parse_order_by_pk_cols(sql: &str) -> Vec<String> {
    let Some(idx) = sql.find("ORDER BY (") else {
        return Vec::new();
    };
    let rest = &sql[idx + "ORDER BY (".len()..];
    let Some(close) = rest.find(')') else {
        return Vec::new();
    };
    rest[..close]
        .split(", ")
        .map(|s| s.trim().to_string())
        .filter(|c| c != "valid_from")
        .collect()
}

fn is_open_tombstone(row: &Row) -> bool {
    let is_open = row
        .get("valid_to")
        .map(|v| v.sql_literal() == crate::scd2::OPEN_VALID_TO.to_string())
        .unwrap_or(false);
    is_delete_op(row) && is_open
}

fn row_pk_matches(row: &Row, pk_cols: &[String], other: &Row) -> bool {
    !pk_cols.is_empty() && pk_cols.iter().all(|c| row.get(c) == other.get(c))
}

/// Earliest `valid_from` among non-delete rows sharing `tombstone`'s primary
/// key with a later `valid_from`, if any.
fn later_reinsert(rows: &[Row], pk_cols: &[String], tombstone: &Row) -> Option<i64> {
    let tombstone_from: i64 = tombstone.get("valid_from").map(|v| v.sql_literal()).and_then(|s| s.parse().ok())?;
    rows.iter()
        .filter(|r| !is_delete_op(r) && row_pk_matches(r, pk_cols, tombstone))
        .filter_map(|r| r.get("valid_from").map(|v| v.sql_literal()).and_then(|s| s.parse::<i64>().ok()))
        .filter(|&vf| vf > tombstone_from)
        .min()
}

fn is_delete_op(row: &Row) -> bool {
    col_string(row, "op") == "D"
}

fn row_matches_predicate_clause(row: &Row, pk_cols: &[String], clause: &str) -> bool {
    if pk_cols.is_empty() {
        return false;
    }
    let parts: Vec<String> = pk_cols
        .iter()
        .filter_map(|c| row.get(c).map(|v| format!("{c} = {}", v.sql_literal())))
        .collect();
    if parts.len() != pk_cols.len() {
        return false;
    }
    let signature = format!("({})", parts.join(" AND "));
    clause.contains(&signature)
}

/// Evaluates a single `col != 'literal'` / `col < literal` condition, the
/// only WHERE shapes this mock's callers ever generate without AND/OR.
fn row_matches_simple_where(row: &Row, clause: &str) -> bool {
    for op in [" != ", " < ", " = "] {
        if let Some((col, rhs)) = clause.split_once(op) {
            let col = col.trim();
            let rhs = rhs.trim().trim_matches('\'');
            let Some(value) = row.get(col) else { return false };
            let lhs = match value {
                Value::Str(s) => s.clone(),
                other => other.sql_literal(),
            };
            return match op {
                " != " => lhs != rhs,
                " = " => lhs == rhs,
                " < " => lhs.parse::<i64>().ok().zip(rhs.parse::<i64>().ok()).map(|(l, r)| l < r).unwrap_or(false),
                _ => unreachable!(),
            };
        }
    }
    true
}

fn set_column(row: &mut Row, name: &str, value: Value) {
    if let Some(entry) = row.0.iter_mut().find(|(n, _)| n == name) {
        entry.1 = value;
    } else {
        row.0.push((name.to_string(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scd2::OPEN_VALID_TO;

    async fn history_table_with_pk(warehouse: &MockWarehouse, pk_col: &str) {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {pk_col} String,\n  name String,\n  valid_from Int64,\n  valid_to Int64,\n  row_hash UInt64,\n  op LowCardinality(String)\n) ENGINE = MergeTree ORDER BY ({pk_col}, valid_from)",
            warehouse.qualify("widget_history"),
        );
        warehouse.exec(&sql).await.unwrap();
    }

    #[tokio::test]
    async fn create_table_recovers_pk_columns_from_order_by() {
        let wh = MockWarehouse::new();
        history_table_with_pk(&wh, "pk").await;
        let qualified = wh.qualify("widget_history");
        assert_eq!(wh.pk_cols.lock().unwrap().get(&qualified).unwrap(), &vec!["pk".to_string()]);
    }

    #[tokio::test]
    async fn bulk_load_upserts_current_table_by_pk() {
        let wh = MockWarehouse::new();
        wh.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  pk String,\n  name String,\n  as_of_ts Int64,\n  row_hash UInt64\n) ENGINE = ReplacingMergeTree(as_of_ts) ORDER BY (pk)",
            wh.qualify("widget_current"),
        ))
        .await
        .unwrap();

        let row_a = Row::new().push("pk", "x").push("name", "a");
        wh.bulk_load("widget_current", &[row_a], 1000).await.unwrap();
        assert_eq!(wh.rows_of("widget_current").len(), 1);

        let row_b = Row::new().push("pk", "x").push("name", "b");
        wh.bulk_load("widget_current", &[row_b], 1000).await.unwrap();
        let rows = wh.rows_of("widget_current");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::Str("b".to_string())));
    }

    #[tokio::test]
    async fn reinsert_backfill_closes_tombstone_at_later_rows_valid_from() {
        let wh = MockWarehouse::new();
        history_table_with_pk(&wh, "pk").await;
        let qualified = wh.qualify("widget_history");
        {
            let mut tables = wh.tables.lock().unwrap();
            let rows = tables.entry(qualified.clone()).or_default();
            rows.push(
                Row::new()
                    .push("pk", "x")
                    .push("name", "a")
                    .push("valid_from", 3i64)
                    .push("valid_to", OPEN_VALID_TO)
                    .push("row_hash", 1i64)
                    .push("op", "D"),
            );
            rows.push(
                Row::new()
                    .push("pk", "x")
                    .push("name", "b")
                    .push("valid_from", 4i64)
                    .push("valid_to", OPEN_VALID_TO)
                    .push("row_hash", 2i64)
                    .push("op", "I"),
            );
        }

        let count_sql = format!(
            "SELECT count() as count FROM {qualified} t INNER JOIN (SELECT pk, valid_from FROM {qualified} WHERE op != 'D') r ON t.pk = r.pk WHERE t.op = 'D' AND t.valid_to = {OPEN_VALID_TO} AND r.valid_from > t.valid_from"
        );
        let affected = wh.count(&count_sql).await.unwrap();
        assert_eq!(affected, 1);

        let update_sql = format!(
            "ALTER TABLE {qualified} UPDATE valid_to = (SELECT min(r.valid_from) FROM {qualified} r WHERE r.op != 'D' AND r.pk = {qualified}.pk AND r.valid_from > {qualified}.valid_from) WHERE op = 'D' AND valid_to = {OPEN_VALID_TO}"
        );
        wh.exec(&update_sql).await.unwrap();

        let tombstone = wh
            .rows_of("widget_history")
            .into_iter()
            .find(|r| col_string(r, "op") == "D")
            .unwrap();
        assert_eq!(tombstone.get("valid_to"), Some(&Value::I64(4)));
    }
}
