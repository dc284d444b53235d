//! Pluggable artifact storage
//!
//! Exporters write through the [`Storage`] trait and never see which
//! backend is behind it. Paths are relative, `/`-separated and may not
//! escape the backend root.

mod cluster;
mod config;
mod file;
mod memory;
mod s3;

#[cfg(test)]
mod tests;

pub use cluster::{ClusterStorage, ClusterStorageConfig, ClusterTlsConfig};
pub use config::StorageConfig;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Storage, S3StorageConfig, SigV4Signer};

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend kind, used in logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    Cluster,
    S3,
    Memory,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::File => "file",
            StorageType::Cluster => "cluster",
            StorageType::S3 => "s3",
            StorageType::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object listed under a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Name relative to the listed directory.
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Object store used for exported artifacts.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn storage_type(&self) -> StorageType;

    /// Write `data` at `path`, replacing any existing object.
    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Read the object at `path`; [`StorageError::NotFound`] if absent.
    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Objects directly under the directory `dir`. A missing directory
    /// lists as empty.
    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageInfo>>;

    async fn delete(&self, path: &str) -> StorageResult<()>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;
}

/// Validate and canonicalize a relative object path.
///
/// Leading and repeated separators are dropped; `.` segments are ignored
/// and `..` is rejected.
pub fn normalize_path(path: &str) -> StorageResult<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            s if s.contains('\\') || s.contains('\0') => {
                return Err(StorageError::InvalidPath(path.to_string()))
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Like [`normalize_path`] but rejects paths naming the root itself.
pub(crate) fn object_path(path: &str) -> StorageResult<String> {
    let normalized = normalize_path(path)?;
    if normalized.is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}
