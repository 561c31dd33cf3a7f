//! Views (C5-C9): each periodically refreshes a slice of the warehouse from
//! an external source, using C2 (SCD2) or C3 (fact ingester) underneath.
//! Modeled after the teacher's `alert_engine`/`slo_engine` shape: a struct
//! holding its dependencies plus a `refresh()` entry point the scheduler
//! calls on a timer.

pub mod geoip_view;
pub mod latency;
pub mod serviceability;
pub mod snapshots;
pub mod usage;

pub use geoip_view::GeoIpView;
pub use latency::LatencyView;
pub use serviceability::ServiceabilityView;
pub use snapshots::SnapshotsView;
pub use usage::UsageView;
