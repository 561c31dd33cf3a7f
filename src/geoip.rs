//! C4 — GeoIP resolver boundary (spec.md §6): `resolve(ip) -> record | null`.
//! Left abstract like the other `rpc/` traits; the C8 GeoIP view consumes it
//! to refresh the `geoip_record` SCD2 dimension.

use crate::models::GeoIpRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoIpError {
    #[error("geoip resolver transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait GeoIpResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Result<Option<GeoIpRecord>, GeoIpError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockGeoIpResolver {
        pub records: HashMap<String, GeoIpRecord>,
    }

    #[async_trait]
    impl GeoIpResolver for MockGeoIpResolver {
        async fn resolve(&self, ip: &str) -> Result<Option<GeoIpRecord>, GeoIpError> {
            Ok(self.records.get(ip).cloned())
        }
    }
}
