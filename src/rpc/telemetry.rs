//! Telemetry RPC (spec.md §6): incremental tail fetch of latency samples.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryRpcError {
    #[error("no data for this key at this epoch")]
    AccountNotFound,
    #[error("telemetry transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LatencyHeader {
    pub start_ts_us: i64,
    pub sample_interval_us: i64,
    pub next_sample_index: i64,
}

/// Raw tail from the telemetry RPC: `rtt_us` values only, newest last. The
/// view (not the transport) is responsible for deriving `sample_index`,
/// `time`, `loss`, and `ipdv_us` (spec.md §4.5 step 3).
pub struct DeviceLatencyTail {
    pub header: LatencyHeader,
    pub start_index_returned: i64,
    pub rtt_us: Vec<i64>,
}

pub struct InternetLatencyTail {
    pub header: LatencyHeader,
    pub rtt_us: Vec<i64>,
}

#[async_trait]
pub trait TelemetryRpc: Send + Sync {
    async fn get_device_latency_tail(
        &self,
        origin: &str,
        target: &str,
        link: &str,
        epoch: i64,
        existing_max_idx: i64,
    ) -> Result<DeviceLatencyTail, TelemetryRpcError>;

    async fn get_internet_latency_samples(
        &self,
        provider: &str,
        origin: &str,
        target: &str,
        agent: &str,
        epoch: i64,
    ) -> Result<InternetLatencyTail, TelemetryRpcError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MockTelemetryRpc {
        pub device_tails: Mutex<HashMap<String, DeviceLatencyTail>>,
    }

    #[async_trait]
    impl TelemetryRpc for MockTelemetryRpc {
        async fn get_device_latency_tail(
            &self,
            origin: &str,
            target: &str,
            link: &str,
            epoch: i64,
            _existing_max_idx: i64,
        ) -> Result<DeviceLatencyTail, TelemetryRpcError> {
            let key = format!("{origin}:{target}:{link}:{epoch}");
            let mut guard = self.device_tails.lock().await;
            guard.remove(&key).ok_or(TelemetryRpcError::AccountNotFound)
        }

        async fn get_internet_latency_samples(
            &self,
            _provider: &str,
            _origin: &str,
            _target: &str,
            _agent: &str,
            _epoch: i64,
        ) -> Result<InternetLatencyTail, TelemetryRpcError> {
            Err(TelemetryRpcError::AccountNotFound)
        }
    }
}
