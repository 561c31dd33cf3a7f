//! C6 — Latency View. Fans out to the telemetry RPC up to `max_concurrency`
//! for each `(origin, target, link)` triple, expands the returned tail into
//! sample rows, and appends them via C3. Per-key fetch errors are logged and
//! skip that key; the refresh as a whole still advances (spec.md §4.5, §7).

use crate::config::LatencyViewConfig;
use crate::error::ViewError;
use crate::fact::{FactIngester, FactTableConfig};
use crate::models::{compute_ipdv_us, DeviceLinkLatencySample, InternetMetroLatencySample};
use crate::rpc::ledger::LedgerRpc;
use crate::rpc::telemetry::TelemetryRpc;
use crate::scd2::ColumnDef;
use crate::warehouse::WarehouseStore;
use futures_util::stream::{self, StreamExt};

pub fn device_link_latency_table() -> FactTableConfig {
    FactTableConfig {
        name: "device_link_latency".to_string(),
        columns: vec![
            ColumnDef::new("origin_device_pk", "String"),
            ColumnDef::new("target_device_pk", "String"),
            ColumnDef::new("link_pk", "String"),
            ColumnDef::new("epoch", "Int64"),
            ColumnDef::new("sample_index", "Int64"),
            ColumnDef::new("time", "Int64"),
            ColumnDef::new("rtt_us", "Int64"),
            ColumnDef::new("loss", "Nullable(Bool)"),
            ColumnDef::new("ipdv_us", "Nullable(Int64)"),
        ],
        partition_by_time: true,
        upsert_key: None,
    }
}

pub fn internet_metro_latency_table() -> FactTableConfig {
    FactTableConfig {
        name: "internet_metro_latency".to_string(),
        columns: vec![
            ColumnDef::new("origin_metro_pk", "String"),
            ColumnDef::new("target_metro_pk", "String"),
            ColumnDef::new("provider", "String"),
            ColumnDef::new("epoch", "Int64"),
            ColumnDef::new("sample_index", "Int64"),
            ColumnDef::new("time", "Int64"),
            ColumnDef::new("rtt_us", "Int64"),
            ColumnDef::new("loss", "Nullable(Bool)"),
            ColumnDef::new("ipdv_us", "Nullable(Int64)"),
        ],
        partition_by_time: true,
        upsert_key: None,
    }
}

/// One `(origin_metro_pk, target_metro_pk, data_provider)` stream to poll,
/// plus the probing `agent` identifier `get_internet_latency_samples` needs
/// but which isn't part of the stream's grouping key (spec.md §4.5 step 4).
#[derive(Debug, Clone)]
pub struct InternetLatencyKey {
    pub origin_metro_pk: String,
    pub target_metro_pk: String,
    pub provider: String,
    pub agent: String,
}

pub struct LatencyView<'a> {
    warehouse: &'a dyn WarehouseStore,
    ledger: &'a dyn LedgerRpc,
    telemetry: &'a dyn TelemetryRpc,
    config: LatencyViewConfig,
}

#[derive(Debug, Default)]
pub struct LatencyRefreshReport {
    pub rows_appended: usize,
    pub keys_failed: usize,
    pub internet_rows_appended: usize,
    pub internet_keys_failed: usize,
}

impl<'a> LatencyView<'a> {
    pub fn new(
        warehouse: &'a dyn WarehouseStore,
        ledger: &'a dyn LedgerRpc,
        telemetry: &'a dyn TelemetryRpc,
        config: LatencyViewConfig,
    ) -> Self {
        Self {
            warehouse,
            ledger,
            telemetry,
            config,
        }
    }

    /// `links` is the set of active `(origin_device_pk, target_device_pk,
    /// link_pk)` triples, typically enumerated from `dz_links_current`
    /// (spec.md §4.5 step 2) by the caller since that query is a plain
    /// warehouse read outside this view's direct concerns.
    pub async fn refresh(
        &self,
        links: &[(String, String, String)],
        internet_keys: &[InternetLatencyKey],
    ) -> Result<LatencyRefreshReport, ViewError> {
        let table = device_link_latency_table();
        let ingester = FactIngester::new(self.warehouse);
        ingester.ensure_schema(&table).await?;

        let internet_table = internet_metro_latency_table();
        ingester.ensure_schema(&internet_table).await?;

        let epoch = self
            .ledger
            .get_epoch_info()
            .await
            .map_err(|e| ViewError::UpstreamUnavailable(e.to_string()))?
            .epoch;

        let existing_max = ingester
            .max_sample_indices(&table, &["origin_device_pk", "target_device_pk", "link_pk"])
            .await?;

        let fetches = stream::iter(links.iter().cloned().map(|(origin, target, link)| {
            let key = format!("{origin}:{target}:{link}:{epoch}");
            let existing = existing_max.get(&key).copied().unwrap_or(-1);
            async move {
                let tail = self
                    .telemetry
                    .get_device_latency_tail(&origin, &target, &link, epoch, existing)
                    .await;
                (origin, target, link, tail)
            }
        }))
        .buffer_unordered(self.config.max_concurrency);

        let results: Vec<_> = fetches.collect().await;

        let mut new_rows = Vec::new();
        let mut keys_failed = 0;
        for (origin, target, link, tail) in results {
            match tail {
                Ok(tail) => expand_device_tail(&origin, &target, &link, epoch, &tail, &mut new_rows),
                Err(e) => {
                    tracing::warn!(origin, target, link, error = %e, "latency tail fetch failed, skipping key");
                    keys_failed += 1;
                }
            }
        }

        let rows_appended = new_rows.len();
        let value_rows: Vec<_> = new_rows.iter().map(|s| s.to_row()).collect();
        ingester.append(&table, &value_rows).await?;

        let internet_fetches = stream::iter(internet_keys.iter().cloned().map(|key| async move {
            let tail = self
                .telemetry
                .get_internet_latency_samples(&key.provider, &key.origin_metro_pk, &key.target_metro_pk, &key.agent, epoch)
                .await;
            (key, tail)
        }))
        .buffer_unordered(self.config.max_concurrency);

        let internet_results: Vec<_> = internet_fetches.collect().await;

        let mut internet_rows = Vec::new();
        let mut internet_keys_failed = 0;
        for (key, tail) in internet_results {
            match tail {
                Ok(tail) => expand_internet_tail(
                    &key.origin_metro_pk,
                    &key.target_metro_pk,
                    &key.provider,
                    epoch,
                    &tail,
                    &mut internet_rows,
                ),
                Err(e) => {
                    tracing::warn!(
                        origin = key.origin_metro_pk,
                        target = key.target_metro_pk,
                        provider = key.provider,
                        error = %e,
                        "internet latency sample fetch failed, skipping key"
                    );
                    internet_keys_failed += 1;
                }
            }
        }

        let internet_rows_appended = internet_rows.len();
        let internet_value_rows: Vec<_> = internet_rows.iter().map(|s| s.to_row()).collect();
        ingester.append(&internet_table, &internet_value_rows).await?;

        Ok(LatencyRefreshReport {
            rows_appended,
            keys_failed,
            internet_rows_appended,
            internet_keys_failed,
        })
    }
}

/// Expands a raw `rtt_us` tail into rows, deriving `sample_index`, `time`,
/// `loss`, and `ipdv_us` (spec.md §4.5 step 3). `ipdv_us` is the absolute
/// difference against the previous non-loss sample in this tail; it is null
/// on the first non-loss sample and at loss boundaries.
fn expand_device_tail(
    origin: &str,
    target: &str,
    link: &str,
    epoch: i64,
    tail: &crate::rpc::telemetry::DeviceLatencyTail,
    out: &mut Vec<DeviceLinkLatencySample>,
) {
    let len = tail.rtt_us.len() as i64;
    let mut rows = Vec::with_capacity(tail.rtt_us.len());
    for (i, rtt_us) in tail.rtt_us.iter().enumerate() {
        let sample_index = tail.header.next_sample_index - len + i as i64;
        let time = tail.header.start_ts_us + sample_index * tail.header.sample_interval_us;
        rows.push(DeviceLinkLatencySample {
            origin_device_pk: origin.to_string(),
            target_device_pk: target.to_string(),
            link_pk: link.to_string(),
            epoch,
            sample_index,
            time,
            rtt_us: *rtt_us,
            loss: Some(*rtt_us == 0),
            ipdv_us: None,
        });
    }
    compute_ipdv_us(&mut rows);
    out.extend(rows);
}

/// Same expansion as `expand_device_tail`, but this stream carries no loss
/// signal (spec.md §4.5 step 4): `loss` is always `None`, and `ipdv_us` is
/// the absolute diff against the immediately preceding sample in the tail
/// (no loss boundary to skip over).
fn expand_internet_tail(
    origin_metro_pk: &str,
    target_metro_pk: &str,
    provider: &str,
    epoch: i64,
    tail: &crate::rpc::telemetry::InternetLatencyTail,
    out: &mut Vec<InternetMetroLatencySample>,
) {
    let len = tail.rtt_us.len() as i64;
    let mut prev: Option<i64> = None;
    for (i, rtt_us) in tail.rtt_us.iter().enumerate() {
        let sample_index = tail.header.next_sample_index - len + i as i64;
        let time = tail.header.start_ts_us + sample_index * tail.header.sample_interval_us;
        let ipdv_us = prev.map(|p| (rtt_us - p).abs());
        prev = Some(*rtt_us);
        out.push(InternetMetroLatencySample {
            origin_metro_pk: origin_metro_pk.to_string(),
            target_metro_pk: target_metro_pk.to_string(),
            provider: provider.to_string(),
            epoch,
            sample_index,
            time,
            rtt_us: *rtt_us,
            loss: None,
            ipdv_us,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::telemetry::LatencyHeader;

    #[test]
    fn device_link_latency_table_name() {
        assert_eq!(device_link_latency_table().table_name(), "device_link_latency_raw");
    }

    #[test]
    fn expand_device_tail_computes_ipdv_and_loss() {
        let tail = crate::rpc::telemetry::DeviceLatencyTail {
            header: LatencyHeader {
                start_ts_us: 1_000_000,
                sample_interval_us: 30_000_000,
                next_sample_index: 3,
            },
            start_index_returned: 0,
            rtt_us: vec![5000, 0, 7000],
        };
        let mut rows = Vec::new();
        expand_device_tail("a", "b", "l", 7, &tail, &mut rows);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].sample_index, 0);
        assert_eq!(rows[0].ipdv_us, None);
        assert!(rows[1].loss.unwrap());
        assert_eq!(rows[1].ipdv_us, None);
        assert_eq!(rows[2].ipdv_us, Some(2000));
    }

    #[test]
    fn expand_internet_tail_never_sets_loss() {
        let tail = crate::rpc::telemetry::InternetLatencyTail {
            header: LatencyHeader {
                start_ts_us: 0,
                sample_interval_us: 60_000_000,
                next_sample_index: 2,
            },
            rtt_us: vec![10_000, 12_000],
        };
        let mut rows = Vec::new();
        expand_internet_tail("m1", "m2", "provider-a", 7, &tail, &mut rows);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.loss.is_none()));
        assert_eq!(rows[0].ipdv_us, None);
        assert_eq!(rows[1].ipdv_us, Some(2000));
    }

    #[test]
    fn internet_metro_latency_table_name() {
        assert_eq!(internet_metro_latency_table().table_name(), "internet_metro_latency_raw");
    }
}
