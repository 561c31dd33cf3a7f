//! Crate-wide error taxonomy: one `thiserror` enum per component boundary,
//! composed via `#[from]` rather than a single flat error type.

use thiserror::Error;

/// Errors raised by the warehouse adapter (C1).
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse query failed: {0}")]
    Query(#[from] clickhouse::error::Error),
    #[error("schema mismatch: table {table} missing column {column}")]
    SchemaMismatch { table: String, column: String },
    #[error("transient upstream error, retry: {0}")]
    Transient(String),
}

/// Errors raised by the SCD2 engine (C2).
#[derive(Debug, Error)]
pub enum Scd2Error {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("snapshot row missing required primary key column {0}")]
    MissingPrimaryKey(String),
    #[error("transaction aborted applying snapshot for {base_name} at {snapshot_ts}: {reason}")]
    TransactionAborted {
        base_name: String,
        snapshot_ts: i64,
        reason: String,
    },
}

/// Errors raised by the fact ingester (C3).
#[derive(Debug, Error)]
pub enum FactError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("fact batch for {table} rejected: {reason}")]
    BatchRejected { table: String, reason: String },
}

/// Errors surfaced by a view refresh. Per-key errors inside a view are
/// absorbed (logged) rather than raised as this type; this type is for
/// whole-view failures (spec.md §7 propagation policy).
#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Scd2(#[from] Scd2Error),
    #[error(transparent)]
    Fact(#[from] FactError),
    #[error("upstream RPC unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("view refresh cancelled")]
    Cancelled,
}

/// Errors from the ReAct agent loop (C11).
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("exceeded max_rounds ({0}) without a final response")]
    MaxRoundsExceeded(usize),
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("context compaction failed: {0}")]
    CompactionFailed(String),
    #[error("agent run cancelled")]
    Cancelled,
}

/// Errors from the tool router (C12).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("duplicate tool name registered by multiple providers: {0}")]
    DuplicateTool(String),
    #[error("tool {name} failed: {message}")]
    Failed { name: String, message: String },
}

impl ToolError {
    /// Render as the `(text, is_error)` pair the agent loop expects when it
    /// turns a tool failure into a tool-result content block.
    pub fn as_tool_result(&self) -> (String, bool) {
        (format!("Error: {self}"), true)
    }
}
