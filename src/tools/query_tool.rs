//! `query` tool (spec.md §6): wraps `Warehouse::query_dynamic` for arbitrary
//! SQL. Output shape is `{columns, column_types, rows, count}`.

use super::ToolProvider;
use crate::agent::transport::ToolSpec;
use crate::warehouse::WarehouseStore;
use async_trait::async_trait;
use serde_json::Value as Json;

pub struct QueryTool<'w> {
    warehouse: &'w dyn WarehouseStore,
}

impl<'w> QueryTool<'w> {
    pub fn new(warehouse: &'w dyn WarehouseStore) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl<'w> ToolProvider for QueryTool<'w> {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "query".to_string(),
            description: "Run a read-only SQL query against the warehouse.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"sql": {"type": "string"}},
                "required": ["sql"],
            }),
        }]
    }

    async fn call_text(&self, _name: &str, args: Json) -> Result<String, String> {
        let sql = args
            .get("sql")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field: sql".to_string())?;

        let result = self.warehouse.query_dynamic(sql).await.map_err(|e| e.to_string())?;

        let column_types: Vec<Json> = result
            .column_types
            .iter()
            .map(|ct| {
                serde_json::json!({
                    "name": ct.name,
                    "database_type_name": ct.database_type_name,
                    "scan_type": ct.scan_type,
                })
            })
            .collect();

        let payload = serde_json::json!({
            "columns": result.columns,
            "column_types": column_types,
            "rows": result.rows,
            "count": result.count,
        });
        serde_json::to_string(&payload).map_err(|e| e.to_string())
    }
}
