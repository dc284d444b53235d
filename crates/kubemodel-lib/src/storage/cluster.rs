//! Storage served by an in-cluster object service over HTTP(S)

use super::{normalize_path, object_path, Storage, StorageInfo, StorageType};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Certificate, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Default port of the cluster storage service.
pub const DEFAULT_CLUSTER_STORAGE_PORT: u16 = 9095;

/// TLS settings for the cluster storage service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterTlsConfig {
    pub insecure_skip_verify: bool,
    pub root_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStorageConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    /// Present when the service is reached over TLS.
    pub tls: Option<ClusterTlsConfig>,
}

impl Default for ClusterStorageConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_CLUSTER_STORAGE_PORT,
            timeout_secs: 60,
            tls: None,
        }
    }
}

impl ClusterStorageConfig {
    /// `https` only when TLS is configured with verification enabled.
    pub fn scheme(&self) -> &'static str {
        match &self.tls {
            Some(tls) if !tls.insecure_skip_verify => "https",
            _ => "http",
        }
    }
}

/// Response envelope used by the cluster storage service.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: u16,
    data: Option<T>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    mod_time: Option<DateTime<Utc>>,
}

/// Client for the cluster storage REST endpoints under `/clusterStorage`.
#[derive(Debug, Clone)]
pub struct ClusterStorage {
    config: ClusterStorageConfig,
    client: reqwest::Client,
}

impl ClusterStorage {
    pub fn new(config: ClusterStorageConfig) -> StorageResult<Self> {
        if config.host.trim().is_empty() {
            return Err(StorageError::Config("cluster storage host is required".to_string()));
        }

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(tls) = &config.tls {
            builder = builder.danger_accept_invalid_certs(tls.insecure_skip_verify);
            if let Some(path) = &tls.root_ca_path {
                let pem = std::fs::read(path)?;
                let cert = Certificate::from_pem(&pem)
                    .map_err(|e| StorageError::Config(format!("invalid root CA: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;

        info!(
            protocol = %config.scheme().to_uppercase(),
            host = %config.host,
            port = config.port,
            "Configured cluster storage"
        );

        Ok(Self { config, client })
    }

    pub fn scheme(&self) -> &'static str {
        self.config.scheme()
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}://{}:{}/clusterStorage/{operation}",
            self.scheme(),
            self.config.host,
            self.config.port
        )
    }

    async fn send(
        &self,
        method: Method,
        operation: &str,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> StorageResult<reqwest::Response> {
        let mut request = self
            .client
            .request(method, self.endpoint(operation))
            .query(&[("path", path)]);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(path.to_string())),
            status => Err(StorageError::Http {
                path: path.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn envelope<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> StorageResult<T> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        if envelope.code != 0 && envelope.code != 200 {
            return Err(StorageError::InvalidResponse(format!(
                "code {}: {}",
                envelope.code, envelope.message
            )));
        }
        envelope
            .data
            .ok_or_else(|| StorageError::InvalidResponse("missing data".to_string()))
    }
}

#[async_trait]
impl Storage for ClusterStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::Cluster
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let path = object_path(path)?;
        self.send(Method::PUT, "write", &path, Some(data.to_vec())).await?;
        debug!(path = %path, bytes = data.len(), "Wrote cluster storage object");
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let path = object_path(path)?;
        let response = self.send(Method::GET, "read", &path, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageInfo>> {
        let dir = normalize_path(dir)?;
        let response = match self.send(Method::GET, "list", &dir, None).await {
            Ok(response) => response,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let entries: Vec<FileEntry> = Self::envelope(response).await?;
        Ok(entries
            .into_iter()
            .map(|e| StorageInfo {
                name: e.name,
                size: e.size,
                modified: e.mod_time,
            })
            .collect())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let path = object_path(path)?;
        self.send(Method::DELETE, "remove", &path, None).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let path = object_path(path)?;
        match self.send(Method::GET, "exists", &path, None).await {
            Ok(response) => Self::envelope(response).await,
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
