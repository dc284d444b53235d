use super::{ClusterStorage, ClusterStorageConfig, FileStorage, MemoryStorage, S3Storage, S3StorageConfig, Storage};
use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Backend selection, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    File { root: PathBuf },
    Cluster(ClusterStorageConfig),
    S3(S3StorageConfig),
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            root: PathBuf::from("/var/configs"),
        }
    }
}

impl StorageConfig {
    pub fn build(&self) -> StorageResult<Arc<dyn Storage>> {
        Ok(match self {
            StorageConfig::File { root } => Arc::new(FileStorage::new(root.clone())),
            StorageConfig::Cluster(config) => Arc::new(ClusterStorage::new(config.clone())?),
            StorageConfig::S3(config) => Arc::new(S3Storage::new(config.clone())?),
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
        })
    }
}
