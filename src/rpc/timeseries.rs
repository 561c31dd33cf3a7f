//! Upstream time-series source (spec.md §4.6): raw per-interface counter
//! samples consumed by the usage view, and the long-lookback baseline path
//! used when the local warehouse has nothing to seed from.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeSeriesError {
    #[error("time series transport error: {0}")]
    Transport(String),
}

/// One raw sample row as handed back by the upstream source, before
/// forward-fill/delta processing (spec.md §4.6 step 3).
#[derive(Debug, Clone)]
pub struct RawCounterRow {
    pub time: i64,
    pub device_pk: String,
    pub intf: String,
    /// Index-aligned with the 16 counters named in spec.md §3
    /// (`in_discards`, `in_errors`, `in_fcs_errors`, `out_discards`,
    /// `out_errors`, plus the 11 dense counters); `None` entries are
    /// missing samples to forward-fill.
    pub counters: [Option<i64>; 16],
}

#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    async fn query_range(
        &self,
        start_unix: i64,
        end_unix: i64,
    ) -> Result<Vec<RawCounterRow>, TimeSeriesError>;

    /// Finds the most recent non-null value for each sparse counter,
    /// strictly before `before_unix`, within `lookback_secs`.
    async fn last_known_before(
        &self,
        before_unix: i64,
        lookback_secs: i64,
    ) -> Result<Vec<RawCounterRow>, TimeSeriesError>;
}
