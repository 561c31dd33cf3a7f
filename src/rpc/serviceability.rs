//! Serviceability RPC (spec.md §6): flat snapshot of the physical network
//! topology entities, source data for the C5 serviceability view.
//!
//! Account data comes back in the program's own wire shapes — pubkeys as
//! raw 32-byte arrays, IPs as raw octets, status as the program's
//! SCREAMING_SNAKE_CASE enum code — rather than the display-ready strings
//! [`crate::models`] entities use. [`crate::views::serviceability`] is
//! responsible for converting each `Raw*` into its display entity before
//! building a snapshot row (spec.md §4.4).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceabilityRpcError {
    #[error("serviceability transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Default)]
pub struct RawContributor {
    pub pubkey: [u8; 32],
    pub code: String,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct RawDevice {
    pub pubkey: [u8; 32],
    pub code: String,
    pub status: String,
    pub contributor_pk: [u8; 32],
    pub metro_pk: [u8; 32],
    pub public_ip: [u8; 4],
}

#[derive(Debug, Clone, Default)]
pub struct RawMetro {
    pub pubkey: [u8; 32],
    pub code: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// `tunnel_net` is the GRE/WireGuard tunnel subnet assigned to the user:
/// octets `a.b.c.d` plus a CIDR prefix length.
#[derive(Debug, Clone, Default)]
pub struct RawUser {
    pub pubkey: [u8; 32],
    pub code: String,
    pub status: String,
    pub device_pk: [u8; 32],
    pub client_ip: [u8; 4],
    pub tunnel_net: (u8, u8, u8, u8, u8),
}

#[derive(Debug, Clone, Default)]
pub struct RawLink {
    pub pubkey: [u8; 32],
    pub code: String,
    pub status: String,
    pub device_a_pk: [u8; 32],
    pub device_z_pk: [u8; 32],
    pub committed_rtt_ns: i64,
    pub committed_jitter_ns: i64,
    pub bandwidth_bps: i64,
    pub isis_delay_override_ns: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramData {
    pub contributors: Vec<RawContributor>,
    pub devices: Vec<RawDevice>,
    pub metros: Vec<RawMetro>,
    pub users: Vec<RawUser>,
    pub links: Vec<RawLink>,
}

#[async_trait]
pub trait ServiceabilityRpc: Send + Sync {
    async fn get_program_data(&self) -> Result<ProgramData, ServiceabilityRpcError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockServiceabilityRpc {
        pub data: ProgramData,
    }

    #[async_trait]
    impl ServiceabilityRpc for MockServiceabilityRpc {
        async fn get_program_data(&self) -> Result<ProgramData, ServiceabilityRpcError> {
            Ok(self.data.clone())
        }
    }
}
