//! In-process storage for tests and dry runs

use super::{normalize_path, object_path, Storage, StorageInfo, StorageType};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored path, in order.
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let key = object_path(path)?;
        self.objects
            .write()
            .await
            .insert(key, (data.to_vec(), Utc::now()));
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = object_path(path)?;
        self.objects
            .read()
            .await
            .get(&key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageInfo>> {
        let dir = normalize_path(dir)?;
        let prefix = if dir.is_empty() { dir } else { format!("{dir}/") };

        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter_map(|(key, (data, modified))| {
                let name = key.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| StorageInfo {
                    name: name.to_string(),
                    size: data.len() as u64,
                    modified: Some(*modified),
                })
            })
            .collect())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = object_path(path)?;
        self.objects
            .write()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let key = object_path(path)?;
        Ok(self.objects.read().await.contains_key(&key))
    }
}
