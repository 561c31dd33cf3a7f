//! Serviceability and Solana-side dimension entities (spec.md §3). Each type
//! mirrors the teacher's `WideEvent`-style flat struct (see the deleted
//! `models/trace.rs`): plain fields, `Serialize`/`Deserialize`, and a
//! `to_snapshot_row()` conversion into the untyped [`crate::value::Row`]
//! shape the SCD2 engine operates on, since entity schemas are only known at
//! runtime via [`crate::scd2::Scd2TableConfig`].

use crate::scd2::SnapshotRow;
use crate::value::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub pubkey: String,
    pub code: String,
    pub status: String,
}

impl Contributor {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("code", self.code.clone())
            .push("status", self.status.clone());
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub pubkey: String,
    pub code: String,
    pub status: String,
    pub contributor_pk: String,
    pub metro_pk: String,
    pub public_ip: String,
}

impl Device {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("code", self.code.clone())
            .push("status", self.status.clone())
            .push("contributor_pk", self.contributor_pk.clone())
            .push("metro_pk", self.metro_pk.clone())
            .push("public_ip", self.public_ip.clone());
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metro {
    pub pubkey: String,
    pub code: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl Metro {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("code", self.code.clone())
            .push("country", self.country.clone())
            .push("lat", self.lat)
            .push("lon", self.lon);
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub pubkey: String,
    pub code: String,
    pub status: String,
    pub device_a_pk: String,
    pub device_z_pk: String,
    pub committed_rtt_ns: i64,
    pub committed_jitter_ns: i64,
    pub bandwidth_bps: i64,
    pub isis_delay_override_ns: Option<i64>,
}

impl Link {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("code", self.code.clone())
            .push("status", self.status.clone())
            .push("device_a_pk", self.device_a_pk.clone())
            .push("device_z_pk", self.device_z_pk.clone())
            .push("committed_rtt_ns", self.committed_rtt_ns)
            .push("committed_jitter_ns", self.committed_jitter_ns)
            .push("bandwidth_bps", self.bandwidth_bps)
            .push("isis_delay_override_ns", self.isis_delay_override_ns);
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub pubkey: String,
    pub code: String,
    pub status: String,
    pub device_pk: String,
    pub client_ip: String,
    /// Assigned tunnel subnet rendered as CIDR, e.g. `"10.0.0.0/24"`.
    pub tunnel_net: String,
}

impl User {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("code", self.code.clone())
            .push("status", self.status.clone())
            .push("device_pk", self.device_pk.clone())
            .push("client_ip", self.client_ip.clone())
            .push("tunnel_net", self.tunnel_net.clone());
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipNode {
    pub pubkey: String,
    pub epoch: i64,
    pub version: String,
    pub shred_version: i64,
    pub gossip_ip: String,
}

impl GossipNode {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("pubkey", self.pubkey.clone());
        let payload = Row::new()
            .push("epoch", self.epoch)
            .push("version", self.version.clone())
            .push("shred_version", self.shred_version)
            .push("gossip_ip", self.gossip_ip.clone());
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteAccount {
    pub pubkey: String,
    pub epoch: i64,
    pub node_pubkey: String,
    pub activated_stake: i64,
    pub commission: i64,
}

impl VoteAccount {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new()
            .push("pubkey", self.pubkey.clone())
            .push("epoch", self.epoch);
        let payload = Row::new()
            .push("node_pubkey", self.node_pubkey.clone())
            .push("activated_stake", self.activated_stake)
            .push("commission", self.commission);
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderScheduleEntry {
    pub pubkey: String,
    pub epoch: i64,
    pub slot_index: i64,
}

impl LeaderScheduleEntry {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new()
            .push("pubkey", self.pubkey.clone())
            .push("epoch", self.epoch)
            .push("slot_index", self.slot_index);
        let payload = Row::new();
        SnapshotRow::new(pk, payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpRecord {
    pub ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub asn: i64,
    pub is_anycast: bool,
    pub is_datacenter: bool,
}

impl GeoIpRecord {
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let pk = Row::new().push("ip", self.ip.clone());
        let payload = Row::new()
            .push("country", self.country.clone())
            .push("region", self.region.clone())
            .push("city", self.city.clone())
            .push("lat", self.lat)
            .push("lon", self.lon)
            .push("asn", self.asn)
            .push("is_anycast", self.is_anycast)
            .push("is_datacenter", self.is_datacenter);
        SnapshotRow::new(pk, payload)
    }
}
