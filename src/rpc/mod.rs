//! Consumed external interfaces (spec.md §6). Each is modeled as an
//! `#[async_trait]` boundary with an in-memory mock, the same shape the
//! teacher uses for its outbound HTTP dependents — trait at the seam,
//! concrete transport left to the caller. No concrete RPC/object-store
//! client is implemented here (out of scope).

pub mod ledger;
pub mod object_store;
pub mod serviceability;
pub mod telemetry;
pub mod timeseries;

pub use ledger::LedgerRpc;
pub use object_store::ObjectStore;
pub use serviceability::ServiceabilityRpc;
pub use telemetry::TelemetryRpc;
pub use timeseries::TimeSeriesSource;
