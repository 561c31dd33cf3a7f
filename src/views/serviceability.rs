//! C5 — Serviceability View. Converts the flat RPC snapshot into SCD2
//! inputs per logical table and applies each with `missing_means_deleted =
//! true`: this view is authoritative for "does this entity still exist".

use crate::error::ViewError;
use crate::models::{Contributor, Device, Link, Metro, User};
use crate::rpc::serviceability::{
    ProgramData, RawContributor, RawDevice, RawLink, RawMetro, RawUser, ServiceabilityRpc,
};
use crate::scd2::{ApplyOutcome, ColumnDef, Scd2Engine, Scd2TableConfig};
use crate::warehouse::WarehouseStore;
use std::net::Ipv4Addr;

fn table_config(base_name: &str, pk: &[&str], payload: &[(&str, &str)]) -> Scd2TableConfig {
    Scd2TableConfig {
        base_name: base_name.to_string(),
        primary_key_columns: pk.iter().map(|c| ColumnDef::new(*c, "String")).collect(),
        payload_columns: payload.iter().map(|(name, ty)| ColumnDef::new(*name, *ty)).collect(),
        missing_means_deleted: true,
        track_ingest_runs: false,
    }
}

pub struct ServiceabilityView<'a> {
    warehouse: &'a dyn WarehouseStore,
    rpc: &'a dyn ServiceabilityRpc,
    clock: &'a dyn Fn() -> i64,
}

#[derive(Debug, Default)]
pub struct ServiceabilityRefreshReport {
    pub contributors: ApplyOutcome,
    pub devices: ApplyOutcome,
    pub metros: ApplyOutcome,
    pub users: ApplyOutcome,
    pub links: ApplyOutcome,
}

impl<'a> ServiceabilityView<'a> {
    pub fn new(warehouse: &'a dyn WarehouseStore, rpc: &'a dyn ServiceabilityRpc, clock: &'a dyn Fn() -> i64) -> Self {
        Self { warehouse, rpc, clock }
    }

    pub async fn refresh(&self) -> Result<ServiceabilityRefreshReport, ViewError> {
        let data: ProgramData = self.rpc.get_program_data().await.map_err(|e| {
            ViewError::UpstreamUnavailable(e.to_string())
        })?;
        let snapshot_ts = (self.clock)();
        let engine = Scd2Engine::new(self.warehouse);

        let contributors_cfg = table_config(
            "dz_contributors",
            &["pubkey"],
            &[("code", "String"), ("status", "String")],
        );
        engine.ensure_schema(&contributors_cfg).await?;
        let contributor_rows: Vec<_> = data.contributors.iter().map(|c| to_contributor(c).to_snapshot_row()).collect();
        let contributors = engine
            .apply_snapshot(&contributors_cfg, &contributor_rows, snapshot_ts, None)
            .await?;

        let devices_cfg = table_config(
            "dz_devices",
            &["pubkey"],
            &[
                ("code", "String"),
                ("status", "String"),
                ("contributor_pk", "String"),
                ("metro_pk", "String"),
                ("public_ip", "String"),
            ],
        );
        engine.ensure_schema(&devices_cfg).await?;
        let device_rows: Vec<_> = data.devices.iter().map(|d| to_device(d).to_snapshot_row()).collect();
        let devices = engine
            .apply_snapshot(&devices_cfg, &device_rows, snapshot_ts, None)
            .await?;

        let metros_cfg = table_config(
            "dz_metros",
            &["pubkey"],
            &[("code", "String"), ("country", "String"), ("lat", "Float64"), ("lon", "Float64")],
        );
        engine.ensure_schema(&metros_cfg).await?;
        let metro_rows: Vec<_> = data.metros.iter().map(|m| to_metro(m).to_snapshot_row()).collect();
        let metros = engine.apply_snapshot(&metros_cfg, &metro_rows, snapshot_ts, None).await?;

        let users_cfg = table_config(
            "dz_users",
            &["pubkey"],
            &[
                ("code", "String"),
                ("status", "String"),
                ("device_pk", "String"),
                ("client_ip", "String"),
                ("tunnel_net", "String"),
            ],
        );
        engine.ensure_schema(&users_cfg).await?;
        let user_rows: Vec<_> = data.users.iter().map(|u| to_user(u).to_snapshot_row()).collect();
        let users = engine.apply_snapshot(&users_cfg, &user_rows, snapshot_ts, None).await?;

        let links_cfg = table_config(
            "dz_links",
            &["pubkey"],
            &[
                ("code", "String"),
                ("status", "String"),
                ("device_a_pk", "String"),
                ("device_z_pk", "String"),
                ("committed_rtt_ns", "Int64"),
                ("committed_jitter_ns", "Int64"),
                ("bandwidth_bps", "Int64"),
                ("isis_delay_override_ns", "Nullable(Int64)"),
            ],
        );
        engine.ensure_schema(&links_cfg).await?;
        let link_rows: Vec<_> = data.links.iter().map(|l| to_link(l).to_snapshot_row()).collect();
        let links = engine.apply_snapshot(&links_cfg, &link_rows, snapshot_ts, None).await?;

        Ok(ServiceabilityRefreshReport {
            contributors,
            devices,
            metros,
            users,
            links,
        })
    }
}

/// Normalizes a tunnel-net `{a, b, c, d, prefix}` quadruple into CIDR
/// notation (spec.md §4.4).
pub fn tunnel_net_to_cidr(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> String {
    format!("{a}.{b}.{c}.{d}/{prefix}")
}

/// Lowercases and kebab-cases an enum-style status code, e.g. `"IN_SERVICE"`
/// -> `"in-service"` (spec.md §4.4).
pub fn kebab_status(code: &str) -> String {
    code.to_lowercase().replace('_', "-")
}

/// Solana-style base58 pubkey rendering (spec.md §4.4).
fn encode_pubkey(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

fn encode_ip(bytes: [u8; 4]) -> String {
    Ipv4Addr::from(bytes).to_string()
}

fn to_contributor(r: &RawContributor) -> Contributor {
    Contributor {
        pubkey: encode_pubkey(&r.pubkey),
        code: r.code.clone(),
        status: kebab_status(&r.status),
    }
}

fn to_device(r: &RawDevice) -> Device {
    Device {
        pubkey: encode_pubkey(&r.pubkey),
        code: r.code.clone(),
        status: kebab_status(&r.status),
        contributor_pk: encode_pubkey(&r.contributor_pk),
        metro_pk: encode_pubkey(&r.metro_pk),
        public_ip: encode_ip(r.public_ip),
    }
}

fn to_metro(r: &RawMetro) -> Metro {
    Metro {
        pubkey: encode_pubkey(&r.pubkey),
        code: r.code.clone(),
        country: r.country.clone(),
        lat: r.lat,
        lon: r.lon,
    }
}

fn to_user(r: &RawUser) -> User {
    let (a, b, c, d, prefix) = r.tunnel_net;
    User {
        pubkey: encode_pubkey(&r.pubkey),
        code: r.code.clone(),
        status: kebab_status(&r.status),
        device_pk: encode_pubkey(&r.device_pk),
        client_ip: encode_ip(r.client_ip),
        tunnel_net: tunnel_net_to_cidr(a, b, c, d, prefix),
    }
}

fn to_link(r: &RawLink) -> Link {
    Link {
        pubkey: encode_pubkey(&r.pubkey),
        code: r.code.clone(),
        status: kebab_status(&r.status),
        device_a_pk: encode_pubkey(&r.device_a_pk),
        device_z_pk: encode_pubkey(&r.device_z_pk),
        committed_rtt_ns: r.committed_rtt_ns,
        committed_jitter_ns: r.committed_jitter_ns,
        bandwidth_bps: r.bandwidth_bps,
        isis_delay_override_ns: r.isis_delay_override_ns,
    }
}
