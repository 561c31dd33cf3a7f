//! Typed configuration for every component. Loading these from a CLI, env,
//! or TOML file is shell glue owned by an external front-end (spec.md §1);
//! this module only defines the shapes and their defaults, mirroring the
//! teacher's `WideConfig`/`StorageConfig` pattern but without a `load()`.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_serviceability_interval")]
    pub serviceability_interval_secs: u64,
    #[serde(default = "default_latency_interval")]
    pub latency_interval_secs: u64,
    #[serde(default = "default_usage_interval")]
    pub usage_interval_secs: u64,
    #[serde(default = "default_geoip_interval")]
    pub geoip_interval_secs: u64,
    #[serde(default = "default_snapshots_interval")]
    pub snapshots_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            serviceability_interval_secs: default_serviceability_interval(),
            latency_interval_secs: default_latency_interval(),
            usage_interval_secs: default_usage_interval(),
            geoip_interval_secs: default_geoip_interval(),
            snapshots_interval_secs: default_snapshots_interval(),
        }
    }
}

fn default_serviceability_interval() -> u64 {
    60
}
fn default_latency_interval() -> u64 {
    30
}
fn default_usage_interval() -> u64 {
    300
}
fn default_geoip_interval() -> u64 {
    600
}
fn default_snapshots_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatencyViewConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for LatencyViewConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageViewConfig {
    #[serde(default = "default_query_window_secs")]
    pub query_window_secs: u64,
    /// Overlap window absorbing late-arriving points on incremental refresh.
    /// See spec.md §9 Open Question: defaults to preserving the source
    /// behavior (non-zero) even though an append-only monotonic upstream
    /// would not strictly need it.
    #[serde(default = "default_overlap_secs")]
    pub overlap_secs: u64,
    #[serde(default = "default_baseline_lookback_secs")]
    pub baseline_lookback_secs: u64,
    #[serde(default = "default_baseline_deadline_secs")]
    pub baseline_deadline_secs: u64,
}

impl Default for UsageViewConfig {
    fn default() -> Self {
        Self {
            query_window_secs: default_query_window_secs(),
            overlap_secs: default_overlap_secs(),
            baseline_lookback_secs: default_baseline_lookback_secs(),
            baseline_deadline_secs: default_baseline_deadline_secs(),
        }
    }
}

impl UsageViewConfig {
    pub fn query_window(&self) -> Duration {
        Duration::from_secs(self.query_window_secs)
    }
    pub fn overlap(&self) -> Duration {
        Duration::from_secs(self.overlap_secs)
    }
    pub fn baseline_deadline(&self) -> Duration {
        Duration::from_secs(self.baseline_deadline_secs)
    }
}

fn default_query_window_secs() -> u64 {
    3600
}
fn default_overlap_secs() -> u64 {
    300
}
fn default_baseline_lookback_secs() -> u64 {
    10 * 365 * 24 * 3600
}
fn default_baseline_deadline_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    pub finalization_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_context_tokens: default_max_context_tokens(),
            finalization_prompt: default_finalization_prompt(),
        }
    }
}

fn default_max_rounds() -> usize {
    10
}
fn default_max_context_tokens() -> usize {
    20_000
}
fn default_finalization_prompt() -> String {
    "You must answer now using only what you already know from the \
     conversation so far. Do not call any more tools."
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryToolConfig {
    #[serde(default = "default_memory_cmd_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_memory_save_timeout_secs")]
    pub save_timeout_secs: u64,
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

impl Default for MemoryToolConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_memory_cmd_timeout_secs(),
            save_timeout_secs: default_memory_save_timeout_secs(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

fn default_memory_cmd_timeout_secs() -> u64 {
    30
}
fn default_memory_save_timeout_secs() -> u64 {
    120
}
fn default_truncate_chars() -> usize {
    10_000
}
