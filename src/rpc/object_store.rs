//! Object store (spec.md §6): list/get over a publicly-readable bucket,
//! used by the GeoIP and snapshots views to pull down periodically
//! published data dumps. Anonymous credentials are the expected path; this
//! trait never models auth, leaving it to the concrete adapter.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified_unix: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists objects under `prefix`. `start_after` resumes a paginated scan
    /// without re-listing already-seen keys (spec.md §6).
    async fn list_objects_v2(
        &self,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<Vec<ObjectMeta>, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockObjectStore {
        pub objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ObjectStore for MockObjectStore {
        async fn list_objects_v2(
            &self,
            prefix: &str,
            start_after: Option<&str>,
        ) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
            let mut keys: Vec<&String> = self
                .objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .filter(|k| start_after.map(|a| k.as_str() > a).unwrap_or(true))
                .collect();
            keys.sort();
            Ok(keys
                .into_iter()
                .map(|k| ObjectMeta {
                    key: k.clone(),
                    size: self.objects[k].len() as u64,
                    last_modified_unix: 0,
                })
                .collect())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
        }
    }
}
