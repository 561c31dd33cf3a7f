//! C1 — Warehouse Adapter.
//!
//! Owns the connection to the embedded columnar engine (ClickHouse, the
//! teacher's own dependency) and exposes the narrow surface every other
//! component needs: executing DDL/DML, bulk-appending rows, qualifying
//! table names, and running maintenance operations. Structured, known-shape
//! reads go through `clickhouse::Client::query(..).fetch_all::<T>()` exactly
//! as the teacher's `handlers/query.rs` does; truly dynamic ad hoc SQL (the
//! `query` tool, C11/C12) goes through the engine's native JSON HTTP
//! interface instead, since the row shape isn't known at compile time.

mod maintenance;
pub mod mock;
mod retry;

pub use maintenance::{CleanupOptions, ExpireSnapshotsResult, MaintenanceOptions};
pub use retry::{is_transient, with_retry, DEFAULT_MAX_ATTEMPTS};

use crate::config::WarehouseConfig;
use crate::error::WarehouseError;
use crate::value::Row;
use async_trait::async_trait;
use clickhouse::Row as ChRow;
use serde::Deserialize;

/// Result of an ad hoc, schema-unknown-at-compile-time SQL query (spec.md §6
/// `query` tool contract).
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub count: usize,
    /// Whether the adapter successfully enforced a read-only session for
    /// this query (spec.md §9 Open Question — an attempt is always made,
    /// but some engine configurations silently reject it).
    pub read_only_enforced: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnType {
    pub name: String,
    pub database_type_name: String,
    pub scan_type: String,
}

/// Minimal row shape used to read back `count()` style scalar queries.
#[derive(Debug, Deserialize, ChRow)]
struct CountRow {
    count: u64,
}

pub struct Warehouse {
    ch: clickhouse::Client,
    http: reqwest::Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

impl Warehouse {
    pub fn connect(cfg: &WarehouseConfig) -> Self {
        let ch = clickhouse::Client::default()
            .with_url(&cfg.url)
            .with_database(&cfg.database)
            .with_user(&cfg.user)
            .with_password(&cfg.password);

        Warehouse {
            ch,
            http: reqwest::Client::new(),
            base_url: cfg.url.clone(),
            database: cfg.database.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
        }
    }

    /// ClickHouse has no catalog/schema distinction separate from the
    /// database name; both identifiers resolve to the same configured
    /// database, which is how `{catalog}.{schema}.{table}` qualification
    /// collapses to `{database}.{table}` below.
    pub fn catalog(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.database
    }

    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.database, table)
    }

    /// Execute DDL or a statement that returns no rows.
    pub async fn exec(&self, sql: &str) -> Result<(), WarehouseError> {
        self.ch.query(sql).execute().await?;
        Ok(())
    }

    pub async fn fetch_all<T>(&self, sql: &str) -> Result<Vec<T>, WarehouseError>
    where
        T: ChRow + for<'de> Deserialize<'de>,
    {
        Ok(self.ch.query(sql).fetch_all::<T>().await?)
    }

    pub async fn fetch_one<T>(&self, sql: &str) -> Result<T, WarehouseError>
    where
        T: ChRow + for<'de> Deserialize<'de>,
    {
        Ok(self.ch.query(sql).fetch_one::<T>().await?)
    }

    pub async fn count(&self, sql: &str) -> Result<u64, WarehouseError> {
        let row: CountRow = self.fetch_one(sql).await?;
        Ok(row.count)
    }

    /// Bulk-append rows into `table`. All rows in the call are appended in
    /// one batch per chunk; a cancelled or failed chunk leaves previously
    /// committed chunks in place (ClickHouse has no cross-statement
    /// transaction to roll those back), so callers that need all-or-nothing
    /// semantics across the whole call (e.g. a single SCD2 apply) must issue
    /// everything as one chunk — see `Scd2Engine::apply_snapshot`.
    pub async fn bulk_load(
        &self,
        table: &str,
        rows: &[Row],
        chunk_size: usize,
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }
        let qualified = self.qualify(table);
        for chunk in rows.chunks(chunk_size.max(1)) {
            let columns = chunk[0].column_names();
            let values: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let rendered: Vec<String> =
                        columns.iter().map(|c| row.get(c).unwrap().sql_literal()).collect();
                    format!("({})", rendered.join(", "))
                })
                .collect();
            let sql = format!(
                "INSERT INTO {qualified} ({}) VALUES {}",
                columns.join(", "),
                values.join(", ")
            );
            self.exec(&sql).await?;
        }
        Ok(())
    }

    /// Execute ad hoc SQL whose result shape isn't known at compile time,
    /// via the engine's native JSON output format. Attempts to enforce a
    /// read-only session per spec.md §9; on conflict with other
    /// engine-enforced settings, falls back to executing without it.
    pub async fn query_dynamic(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        match self.query_dynamic_with_settings(sql, true).await {
            Ok(result) => Ok(result),
            Err(_) => self.query_dynamic_with_settings(sql, false).await,
        }
    }

    async fn query_dynamic_with_settings(
        &self,
        sql: &str,
        readonly: bool,
    ) -> Result<QueryResult, WarehouseError> {
        let body = format!("{} FORMAT JSON", sql.trim_end_matches(';'));
        let mut req = self
            .http
            .post(&self.base_url)
            .query(&[("database", self.database.as_str())]);
        if readonly {
            req = req.query(&[("readonly", "1")]);
        }
        if !self.user.is_empty() {
            req = req.basic_auth(&self.user, Some(&self.password));
        }
        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| WarehouseError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(WarehouseError::Transient(format!(
                "clickhouse http {status}: {text}"
            )));
        }
        let body: ClickHouseJson = resp
            .json()
            .await
            .map_err(|e| WarehouseError::Transient(e.to_string()))?;

        let columns: Vec<String> = body.meta.iter().map(|m| m.name.clone()).collect();
        let column_types: Vec<ColumnType> = body
            .meta
            .iter()
            .map(|m| ColumnType {
                name: m.name.clone(),
                database_type_name: m.r#type.clone(),
                scan_type: scan_type_for(&m.r#type),
            })
            .collect();

        Ok(QueryResult {
            columns,
            column_types,
            rows: body.data,
            count: body.rows,
            read_only_enforced: readonly,
        })
    }
}

/// Narrow warehouse surface actually used by the SCD2 engine, fact
/// ingester, views, and the `query` tool (spec.md §6) — every generic
/// `fetch_all`/`fetch_one` helper on [`Warehouse`] stays inherent-only
/// since nothing outside this module calls them directly. Mirrors the
/// trait+mock treatment every `rpc/*` boundary already gets (e.g.
/// `rpc::ledger::LedgerRpc`), so `Scd2Engine`/`FactIngester`/the view
/// layer can run against [`mock::MockWarehouse`] without a live engine.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    fn qualify(&self, table: &str) -> String;
    async fn exec(&self, sql: &str) -> Result<(), WarehouseError>;
    async fn bulk_load(&self, table: &str, rows: &[Row], chunk_size: usize) -> Result<(), WarehouseError>;
    async fn query_dynamic(&self, sql: &str) -> Result<QueryResult, WarehouseError>;
    async fn count(&self, sql: &str) -> Result<u64, WarehouseError>;
    async fn rewrite_data_files(&self, table: &str, threshold_bytes: u64) -> Result<(), WarehouseError>;
}

#[async_trait]
impl WarehouseStore for Warehouse {
    fn qualify(&self, table: &str) -> String {
        Warehouse::qualify(self, table)
    }

    async fn exec(&self, sql: &str) -> Result<(), WarehouseError> {
        Warehouse::exec(self, sql).await
    }

    async fn bulk_load(&self, table: &str, rows: &[Row], chunk_size: usize) -> Result<(), WarehouseError> {
        Warehouse::bulk_load(self, table, rows, chunk_size).await
    }

    async fn query_dynamic(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        Warehouse::query_dynamic(self, sql).await
    }

    async fn count(&self, sql: &str) -> Result<u64, WarehouseError> {
        Warehouse::count(self, sql).await
    }

    async fn rewrite_data_files(&self, table: &str, threshold_bytes: u64) -> Result<(), WarehouseError> {
        Warehouse::rewrite_data_files(self, table, threshold_bytes).await
    }
}

#[derive(Debug, Deserialize)]
struct ClickHouseJson {
    meta: Vec<ClickHouseMeta>,
    data: Vec<serde_json::Map<String, serde_json::Value>>,
    rows: usize,
}

#[derive(Debug, Deserialize)]
struct ClickHouseMeta {
    name: String,
    #[serde(rename = "type")]
    r#type: String,
}

/// Coarse classification of a ClickHouse type name into the handful of
/// scan-time buckets a caller needs to decode JSON values correctly.
fn scan_type_for(ch_type: &str) -> String {
    let t = ch_type.trim_start_matches("Nullable(").trim_end_matches(')');
    if t.starts_with("Int") || t.starts_with("UInt") {
        "int64".to_string()
    } else if t.starts_with("Float") || t.starts_with("Decimal") {
        "float64".to_string()
    } else if t == "Bool" {
        "bool".to_string()
    } else if t.starts_with("DateTime") || t == "Date" {
        "string".to_string()
    } else if t.starts_with("Array") {
        "array".to_string()
    } else {
        "string".to_string()
    }
}
