//! Prometheus client configuration

use crate::error::{SourceError, SourceResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-query timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default TCP keep-alive
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 120;
/// Default TLS handshake timeout
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Default number of queries in flight
pub const DEFAULT_QUERY_CONCURRENCY: usize = 5;
/// Default source resolution
pub const DEFAULT_RESOLUTION_SECS: u64 = 300;
/// Default label identifying the cluster of a series
pub const DEFAULT_CLUSTER_LABEL: &str = "cluster_id";

/// Basic or bearer credentials. A non-empty bearer token takes precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientAuth {
    pub username: String,
    pub password: String,
    pub bearer_token: String,
}

/// Retry policy for rate-limited (429/503) responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitRetry {
    pub max_retries: u32,
    /// Wait used when the response carries no `Retry-After` header.
    pub default_wait_secs: u64,
}

impl Default for RateLimitRetry {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_wait_secs: 10,
        }
    }
}

/// Connection and query settings for a Prometheus-compatible backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Base URL of the backend; required.
    pub server_endpoint: String,
    pub timeout_secs: u64,
    pub keep_alive_secs: u64,
    pub tls_handshake_timeout_secs: u64,
    pub tls_insecure_skip_verify: bool,
    /// PEM bundle of additional trusted roots.
    pub root_ca_path: Option<PathBuf>,
    /// PEM client certificate for mTLS; used with `client_key_path`.
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub auth: ClientAuth,
    pub query_concurrency: usize,
    pub rate_limit_retry: Option<RateLimitRetry>,
    /// Tenant sent as `X-Scope-OrgID`.
    pub header_x_scope_org_id: String,
    pub resolution_secs: u64,
    pub cluster_label: String,
    pub cluster_id: String,
    /// Raw label matcher overriding `cluster_label`/`cluster_id`.
    pub cluster_filter: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            server_endpoint: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            tls_handshake_timeout_secs: DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS,
            tls_insecure_skip_verify: false,
            root_ca_path: None,
            client_cert_path: None,
            client_key_path: None,
            auth: ClientAuth::default(),
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
            rate_limit_retry: None,
            header_x_scope_org_id: String::new(),
            resolution_secs: DEFAULT_RESOLUTION_SECS,
            cluster_label: DEFAULT_CLUSTER_LABEL.to_string(),
            cluster_id: String::new(),
            cluster_filter: String::new(),
        }
    }
}

impl PrometheusConfig {
    pub fn new(server_endpoint: impl Into<String>) -> Self {
        Self {
            server_endpoint: server_endpoint.into(),
            ..Default::default()
        }
    }

    /// Reject configurations the client cannot start with.
    pub fn validate(&self) -> SourceResult<()> {
        if self.server_endpoint.trim().is_empty() {
            return Err(SourceError::Config(
                "no address for prometheus set in prometheus.server_endpoint".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SourceError::Config(
                "prometheus.timeout_secs must be positive".to_string(),
            ));
        }
        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(SourceError::Config(
                "client_cert_path and client_key_path must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Source resolution rounded down to whole minutes, at least one minute.
    pub fn data_resolution(&self) -> Duration {
        let minutes = (self.resolution_secs / 60).max(1);
        Duration::from_secs(minutes * 60)
    }

    pub fn is_rate_limit_retry_enabled(&self) -> bool {
        self.rate_limit_retry.is_some()
    }

    /// Label matcher restricting queries to this cluster, if any.
    pub fn cluster_matcher(&self) -> Option<String> {
        if !self.cluster_filter.is_empty() {
            Some(self.cluster_filter.clone())
        } else if !self.cluster_id.is_empty() {
            Some(format!("{}=\"{}\"", self.cluster_label, self.cluster_id))
        } else {
            None
        }
    }
}
