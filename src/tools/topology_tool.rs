//! `isis_*` tools (spec.md §6): a cached in-memory topology snapshot,
//! refreshed on demand and read concurrently. Guarded by a
//! reader-writer lock that only takes the writer side when swapping the
//! entire snapshot (spec.md §5 shared-resource policy).

use super::ToolProvider;
use crate::agent::transport::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRecord {
    pub hostname: String,
    pub location: String,
    pub router_type: String,
    pub is_healthy: bool,
    pub neighbor_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjacency {
    pub source: String,
    pub dest: String,
    pub metric: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub routers: Vec<RouterRecord>,
    pub adjacencies: Vec<Adjacency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub timestamp: i64,
    pub router_count: usize,
    pub link_count: usize,
    pub healthy_percent: f64,
}

/// Loads a fresh topology snapshot from an IS-IS LSDB dump. The concrete
/// source (an S3 object or a local path per the tool's `source` argument)
/// is left to the implementation; this trait only carries the contract the
/// tool needs.
#[async_trait]
pub trait TopologyLoader: Send + Sync {
    async fn load(&self, level: Option<u8>, source: Option<&str>) -> Result<NetworkSnapshot, String>;
}

struct CachedState {
    snapshot: NetworkSnapshot,
    stats: NetworkStats,
}

pub struct TopologyTool<'c> {
    loader: &'c dyn TopologyLoader,
    cache: RwLock<Option<CachedState>>,
    clock: &'c (dyn Fn() -> i64 + Send + Sync),
}

impl<'c> TopologyTool<'c> {
    pub fn new(loader: &'c dyn TopologyLoader, clock: &'c (dyn Fn() -> i64 + Send + Sync)) -> Self {
        Self {
            loader,
            cache: RwLock::new(None),
            clock,
        }
    }

    async fn refresh(&self, level: Option<u8>, source: Option<&str>) -> Result<NetworkStats, String> {
        let snapshot = self.loader.load(level, source).await?;
        let router_count = snapshot.routers.len();
        let link_count = snapshot.adjacencies.len();
        let healthy = snapshot.routers.iter().filter(|r| r.is_healthy).count();
        let healthy_percent = if router_count == 0 {
            0.0
        } else {
            (healthy as f64 / router_count as f64) * 100.0
        };
        let stats = NetworkStats {
            timestamp: (self.clock)(),
            router_count,
            link_count,
            healthy_percent,
        };

        let mut guard = self.cache.write().await;
        *guard = Some(CachedState {
            snapshot,
            stats: stats.clone(),
        });
        Ok(stats)
    }
}

#[async_trait]
impl<'c> ToolProvider for TopologyTool<'c> {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "isis_refresh".to_string(),
                description: "Refresh the cached IS-IS topology snapshot.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "level": {"type": "integer", "enum": [1, 2]},
                        "source": {"type": "string"},
                    },
                }),
            },
            ToolSpec {
                name: "isis_get_summary".to_string(),
                description: "Return the cached network stats.".to_string(),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            },
            ToolSpec {
                name: "isis_list_routers".to_string(),
                description: "List routers, optionally filtered by location.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"location": {"type": "string"}},
                }),
            },
            ToolSpec {
                name: "isis_get_router".to_string(),
                description: "Return a single router record by hostname.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"hostname": {"type": "string"}},
                    "required": ["hostname"],
                }),
            },
            ToolSpec {
                name: "isis_get_adjacencies".to_string(),
                description: "List adjacencies, optionally filtered by router.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"router": {"type": "string"}},
                }),
            },
        ]
    }

    async fn call_text(&self, name: &str, args: Json) -> Result<String, String> {
        match name {
            "isis_refresh" => {
                let level = args.get("level").and_then(|v| v.as_u64()).map(|v| v as u8);
                let source = args.get("source").and_then(|v| v.as_str());
                let stats = self.refresh(level, source).await?;
                serde_json::to_string(&stats).map_err(|e| e.to_string())
            }
            "isis_get_summary" => {
                let guard = self.cache.read().await;
                let state = guard.as_ref().ok_or("topology cache is empty, call isis_refresh first")?;
                serde_json::to_string(&state.stats).map_err(|e| e.to_string())
            }
            "isis_list_routers" => {
                let guard = self.cache.read().await;
                let state = guard.as_ref().ok_or("topology cache is empty, call isis_refresh first")?;
                let location = args.get("location").and_then(|v| v.as_str());
                let mut routers: Vec<&RouterRecord> = state
                    .snapshot
                    .routers
                    .iter()
                    .filter(|r| location.map(|loc| r.location == loc).unwrap_or(true))
                    .collect();
                routers.sort_by(|a, b| a.hostname.cmp(&b.hostname));
                serde_json::to_string(&routers).map_err(|e| e.to_string())
            }
            "isis_get_router" => {
                let hostname = args
                    .get("hostname")
                    .and_then(|v| v.as_str())
                    .ok_or("missing required field: hostname")?;
                let guard = self.cache.read().await;
                let state = guard.as_ref().ok_or("topology cache is empty, call isis_refresh first")?;
                let router = state
                    .snapshot
                    .routers
                    .iter()
                    .find(|r| r.hostname == hostname)
                    .ok_or_else(|| format!("no router named {hostname}"))?;
                serde_json::to_string(router).map_err(|e| e.to_string())
            }
            "isis_get_adjacencies" => {
                let router = args.get("router").and_then(|v| v.as_str());
                let guard = self.cache.read().await;
                let state = guard.as_ref().ok_or("topology cache is empty, call isis_refresh first")?;
                let mut adjacencies: Vec<&Adjacency> = state
                    .snapshot
                    .adjacencies
                    .iter()
                    .filter(|a| router.map(|r| a.source == r || a.dest == r).unwrap_or(true))
                    .collect();
                adjacencies.sort_by(|a, b| (a.source.as_str(), a.dest.as_str()).cmp(&(b.source.as_str(), b.dest.as_str())));
                serde_json::to_string(&adjacencies).map_err(|e| e.to_string())
            }
            other => Err(format!("unknown topology tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticLoader;

    #[async_trait]
    impl TopologyLoader for StaticLoader {
        async fn load(&self, _level: Option<u8>, _source: Option<&str>) -> Result<NetworkSnapshot, String> {
            Ok(NetworkSnapshot {
                routers: vec![
                    RouterRecord {
                        hostname: "r2".into(),
                        location: "ny".into(),
                        router_type: "core".into(),
                        is_healthy: true,
                        neighbor_count: 2,
                    },
                    RouterRecord {
                        hostname: "r1".into(),
                        location: "ny".into(),
                        router_type: "edge".into(),
                        is_healthy: false,
                        neighbor_count: 1,
                    },
                ],
                adjacencies: vec![Adjacency {
                    source: "r1".into(),
                    dest: "r2".into(),
                    metric: 10,
                }],
            })
        }
    }

    #[tokio::test]
    async fn list_routers_is_sorted_by_hostname() {
        let loader = StaticLoader;
        let clock = || 100i64;
        let tool = TopologyTool::new(&loader, &clock);
        tool.call_text("isis_refresh", serde_json::json!({})).await.unwrap();
        let text = tool.call_text("isis_list_routers", serde_json::json!({})).await.unwrap();
        let routers: Vec<RouterRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(routers[0].hostname, "r1");
        assert_eq!(routers[1].hostname, "r2");
    }

    #[tokio::test]
    async fn summary_before_refresh_errors() {
        let loader = StaticLoader;
        let clock = || 100i64;
        let tool = TopologyTool::new(&loader, &clock);
        assert!(tool.call_text("isis_get_summary", serde_json::json!({})).await.is_err());
    }
}
