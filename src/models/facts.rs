//! Fact rows (spec.md §3, §4.3): samples appended to `{name}_raw` tables by
//! the C3 fact ingester. Each type exposes a `stream_key()` (the
//! `(origin, target, link_or_provider)`-style grouping used by
//! `max_sample_indices`) and a `to_row()` conversion into [`crate::value::Row`].

use crate::value::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLinkLatencySample {
    pub origin_device_pk: String,
    pub target_device_pk: String,
    pub link_pk: String,
    pub epoch: i64,
    pub sample_index: i64,
    pub time: i64,
    /// `0` signals loss on device-link samples (spec.md §3).
    pub rtt_us: i64,
    pub loss: Option<bool>,
    pub ipdv_us: Option<i64>,
}

impl DeviceLinkLatencySample {
    pub fn is_loss(&self) -> bool {
        self.rtt_us == 0
    }

    pub fn stream_key(&self) -> String {
        format!("{}:{}:{}", self.origin_device_pk, self.target_device_pk, self.link_pk)
    }

    pub fn to_row(&self) -> Row {
        Row::new()
            .push("origin_device_pk", self.origin_device_pk.clone())
            .push("target_device_pk", self.target_device_pk.clone())
            .push("link_pk", self.link_pk.clone())
            .push("epoch", self.epoch)
            .push("sample_index", self.sample_index)
            .push("time", self.time)
            .push("rtt_us", self.rtt_us)
            .push("loss", self.loss)
            .push("ipdv_us", self.ipdv_us)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternetMetroLatencySample {
    pub origin_metro_pk: String,
    pub target_metro_pk: String,
    pub provider: String,
    pub epoch: i64,
    pub sample_index: i64,
    pub time: i64,
    pub rtt_us: i64,
    pub loss: Option<bool>,
    pub ipdv_us: Option<i64>,
}

impl InternetMetroLatencySample {
    pub fn stream_key(&self) -> String {
        format!("{}:{}:{}", self.origin_metro_pk, self.target_metro_pk, self.provider)
    }

    pub fn to_row(&self) -> Row {
        Row::new()
            .push("origin_metro_pk", self.origin_metro_pk.clone())
            .push("target_metro_pk", self.target_metro_pk.clone())
            .push("provider", self.provider.clone())
            .push("epoch", self.epoch)
            .push("sample_index", self.sample_index)
            .push("time", self.time)
            .push("rtt_us", self.rtt_us)
            .push("loss", self.loss)
            .push("ipdv_us", self.ipdv_us)
    }
}

/// Computes |rtt[n] - rtt[n-1]| ignoring losses, per spec.md §3's IPDV
/// definition. `samples` must already be ordered by `sample_index`.
pub fn compute_ipdv_us(samples: &mut [DeviceLinkLatencySample]) {
    let mut prev_rtt: Option<i64> = None;
    for sample in samples.iter_mut() {
        if sample.is_loss() {
            sample.ipdv_us = None;
            continue;
        }
        sample.ipdv_us = prev_rtt.map(|p| (sample.rtt_us - p).abs());
        prev_rtt = Some(sample.rtt_us);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSide {
    A,
    Z,
}

impl LinkSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSide::A => "A",
            LinkSide::Z => "Z",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceUsage {
    pub time: i64,
    pub device_pk: String,
    pub intf: String,
    pub link_pk: Option<String>,
    pub link_side: Option<String>,
    pub delta_duration_secs: Option<f64>,
    pub counters: [i64; 16],
    pub deltas: [Option<i64>; 16],
}

impl InterfaceUsage {
    pub fn key(&self) -> String {
        format!("{}:{}", self.device_pk, self.intf)
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new()
            .push("time", self.time)
            .push("device_pk", self.device_pk.clone())
            .push("intf", self.intf.clone())
            .push("link_pk", self.link_pk.clone())
            .push("link_side", self.link_side.clone())
            .push("delta_duration_secs", self.delta_duration_secs);
        for (i, v) in self.counters.iter().enumerate() {
            row = row.push(format!("counter_{i}"), *v);
        }
        for (i, v) in self.deltas.iter().enumerate() {
            row = row.push(format!("delta_{i}"), *v);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(idx: i64, rtt: i64) -> DeviceLinkLatencySample {
        DeviceLinkLatencySample {
            origin_device_pk: "a".into(),
            target_device_pk: "b".into(),
            link_pk: "l".into(),
            epoch: 1,
            sample_index: idx,
            time: idx,
            rtt_us: rtt,
            loss: Some(rtt == 0),
            ipdv_us: None,
        }
    }

    #[test]
    fn ipdv_ignores_losses() {
        let mut samples = vec![sample(0, 100), sample(1, 0), sample(2, 130)];
        compute_ipdv_us(&mut samples);
        assert_eq!(samples[0].ipdv_us, None);
        assert_eq!(samples[1].ipdv_us, None);
        assert_eq!(samples[2].ipdv_us, Some(30));
    }

}
