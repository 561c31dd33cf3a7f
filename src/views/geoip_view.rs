//! C8 — GeoIP View (spec.md §4.7). Gathers distinct IPs from the
//! serviceability and gossip dimensions, resolves each via C4, and applies
//! with `missing_means_deleted = false`: a resolvable IP is never forgotten,
//! it only ages out by explicit policy outside this view's scope.

use crate::error::ViewError;
use crate::geoip::GeoIpResolver;
use crate::scd2::{ApplyOutcome, ColumnDef, Scd2Engine, Scd2TableConfig};
use crate::warehouse::WarehouseStore;
use std::collections::HashSet;

fn geoip_table_config() -> Scd2TableConfig {
    Scd2TableConfig {
        base_name: "geoip_record".to_string(),
        primary_key_columns: vec![ColumnDef::new("ip", "String")],
        payload_columns: vec![
            ColumnDef::new("country", "String"),
            ColumnDef::new("region", "String"),
            ColumnDef::new("city", "String"),
            ColumnDef::new("lat", "Float64"),
            ColumnDef::new("lon", "Float64"),
            ColumnDef::new("asn", "Int64"),
            ColumnDef::new("is_anycast", "Bool"),
            ColumnDef::new("is_datacenter", "Bool"),
        ],
        missing_means_deleted: false,
        track_ingest_runs: false,
    }
}

pub struct GeoIpView<'a> {
    warehouse: &'a dyn WarehouseStore,
    resolver: &'a dyn GeoIpResolver,
    clock: &'a dyn Fn() -> i64,
}

impl<'a> GeoIpView<'a> {
    pub fn new(warehouse: &'a dyn WarehouseStore, resolver: &'a dyn GeoIpResolver, clock: &'a dyn Fn() -> i64) -> Self {
        Self {
            warehouse,
            resolver,
            clock,
        }
    }

    pub async fn refresh(&self, candidate_ips: &[String]) -> Result<ApplyOutcome, ViewError> {
        let distinct: HashSet<&str> = candidate_ips.iter().map(|s| s.as_str()).collect();

        let mut rows = Vec::new();
        for ip in distinct {
            match self.resolver.resolve(ip).await {
                Ok(Some(record)) => rows.push(record.to_snapshot_row()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(ip, error = %e, "geoip resolve failed, skipping ip");
                }
            }
        }

        let config = geoip_table_config();
        let engine = Scd2Engine::new(self.warehouse);
        engine.ensure_schema(&config).await?;
        let snapshot_ts = (self.clock)();
        let outcome = engine.apply_snapshot(&config, &rows, snapshot_ts, None).await?;
        Ok(outcome)
    }
}

/// Collects distinct client IPs from `dz_users_current` and gossip
/// `gossip_ip` values (spec.md §4.7). Left as a free function since it is a
/// plain warehouse read outside the SCD2/GeoIP-resolver concerns this view
/// otherwise owns.
pub async fn collect_candidate_ips(warehouse: &dyn WarehouseStore) -> Result<Vec<String>, ViewError> {
    let mut ips = Vec::new();
    let sql = format!(
        "SELECT DISTINCT client_ip FROM {} WHERE client_ip != ''",
        warehouse.qualify("dz_users_current"),
    );
    if let Ok(result) = warehouse.query_dynamic(&sql).await {
        for row in &result.rows {
            if let Some(ip) = row.get("client_ip").and_then(|v| v.as_str()) {
                ips.push(ip.to_string());
            }
        }
    }

    let gossip_sql = format!(
        "SELECT DISTINCT gossip_ip FROM {} WHERE gossip_ip != ''",
        warehouse.qualify("gossip_node_current"),
    );
    if let Ok(result) = warehouse.query_dynamic(&gossip_sql).await {
        for row in &result.rows {
            if let Some(ip) = row.get("gossip_ip").and_then(|v| v.as_str()) {
                ips.push(ip.to_string());
            }
        }
    }

    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geoip_table_has_open_disappearance_policy() {
        assert!(!geoip_table_config().missing_means_deleted);
    }
}
