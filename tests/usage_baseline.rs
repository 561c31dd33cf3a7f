//! Scenario C (spec.md §8): a clean-warehouse usage refresh swallows the
//! first sample as an in-memory baseline, emits deltas for the rest, and a
//! later overlapping rerun stays idempotent on already-stored rows while
//! picking up the new one.

use async_trait::async_trait;
use lakeview_core::config::UsageViewConfig;
use lakeview_core::rpc::timeseries::{RawCounterRow, TimeSeriesError, TimeSeriesSource};
use lakeview_core::views::usage::LinkMembership;
use lakeview_core::views::UsageView;
use lakeview_core::warehouse::mock::MockWarehouse;

#[derive(Default)]
struct StubTimeSeriesSource {
    rows: Vec<RawCounterRow>,
}

#[async_trait]
impl TimeSeriesSource for StubTimeSeriesSource {
    async fn query_range(&self, start_unix: i64, end_unix: i64) -> Result<Vec<RawCounterRow>, TimeSeriesError> {
        Ok(self.rows.iter().filter(|r| r.time >= start_unix && r.time < end_unix).cloned().collect())
    }

    async fn last_known_before(&self, _before_unix: i64, _lookback_secs: i64) -> Result<Vec<RawCounterRow>, TimeSeriesError> {
        Ok(Vec::new())
    }
}

fn counters_with(idx: usize, value: i64) -> [Option<i64>; 16] {
    let mut c = [None; 16];
    c[idx] = Some(value);
    c
}

fn row_at(time: i64, value: i64) -> RawCounterRow {
    RawCounterRow {
        time,
        device_pk: "D1".to_string(),
        intf: "E1".to_string(),
        counters: counters_with(0, value),
    }
}

fn delta0(row: &lakeview_core::value::Row) -> Option<i64> {
    row.get("delta_0").and_then(|v| v.sql_literal().parse::<i64>().ok())
}

#[tokio::test]
async fn first_row_is_baseline_then_reruns_stay_idempotent() {
    let wh = MockWarehouse::new();
    let source = StubTimeSeriesSource {
        rows: vec![row_at(1000, 100), row_at(1060, 150), row_at(1120, 225), row_at(1180, 300)],
    };
    let view = UsageView::new(&wh, &source, UsageViewConfig::default());
    let links: Vec<LinkMembership> = Vec::new();

    // Clean warehouse: only t0..t2 are visible yet (now=1150).
    let report = view.refresh(1150, &links).await.unwrap();
    assert_eq!(report.baseline_keys, 1);
    assert_eq!(report.rows_upserted, 2);
    let stored = wh.rows_of("usage_raw");
    assert_eq!(stored.len(), 2);
    let mut times: Vec<i64> = stored.iter().map(|r| r.get("time").unwrap().sql_literal().parse().unwrap()).collect();
    times.sort();
    assert_eq!(times, vec![1060, 1120]);
    let at_1060 = stored.iter().find(|r| r.get("time").unwrap().sql_literal() == "1060").unwrap();
    assert_eq!(delta0(at_1060), Some(50));
    let at_1120 = stored.iter().find(|r| r.get("time").unwrap().sql_literal() == "1120").unwrap();
    assert_eq!(delta0(at_1120), Some(75));

    // Rerun after t3 arrives; the default overlap window re-walks from
    // before t0, so the rerun re-baselines and re-emits t1/t2 identically.
    let report = view.refresh(1250, &links).await.unwrap();
    assert_eq!(report.rows_upserted, 3);
    let stored = wh.rows_of("usage_raw");
    assert_eq!(stored.len(), 3);
    let mut times: Vec<i64> = stored.iter().map(|r| r.get("time").unwrap().sql_literal().parse().unwrap()).collect();
    times.sort();
    assert_eq!(times, vec![1060, 1120, 1180]);

    let at_1060 = stored.iter().find(|r| r.get("time").unwrap().sql_literal() == "1060").unwrap();
    assert_eq!(delta0(at_1060), Some(50));
    let at_1120 = stored.iter().find(|r| r.get("time").unwrap().sql_literal() == "1120").unwrap();
    assert_eq!(delta0(at_1120), Some(75));
    let at_1180 = stored.iter().find(|r| r.get("time").unwrap().sql_literal() == "1180").unwrap();
    assert_eq!(delta0(at_1180), Some(75));
}
