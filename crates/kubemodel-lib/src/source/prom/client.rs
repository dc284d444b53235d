//! HTTP client for the Prometheus query API
//!
//! Handles authentication headers, the tenant header, bounded concurrency
//! and retries on rate-limited responses. Responses are converted into
//! [`QueryResult`]s.

use super::config::{ClientAuth, PrometheusConfig, RateLimitRetry};
use crate::error::{SourceError, SourceResult};
use crate::source::{DataPoint, QueryResponse, QueryResult};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Certificate, Identity, Request, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// Tenant header understood by Cortex, Mimir and Thanos.
pub const HEADER_X_SCOPE_ORG_ID: &str = "X-Scope-OrgID";

const LABEL_PREFIX: &str = "label_";
const ANNOTATION_PREFIX: &str = "annotation_";
const MAX_ERROR_BODY: usize = 512;

/// Series labels that identify the entity a result describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesKeys {
    /// Label carrying the entity UID.
    pub uid: &'static str,
    /// Label carrying the entity name.
    pub name: &'static str,
}

impl SeriesKeys {
    pub const fn new(uid: &'static str, name: &'static str) -> Self {
        Self { uid, name }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum ApiData {
    Matrix(Vec<MatrixSeries>),
    Vector(Vec<VectorSample>),
    Scalar((f64, String)),
    String((f64, String)),
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Client for `/api/v1/query` and `/api/v1/query_range`.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
    base: Url,
    auth: ClientAuth,
    org_id: String,
    retry: Option<RateLimitRetry>,
    permits: Arc<Semaphore>,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> SourceResult<Self> {
        config.validate()?;

        let base = Url::parse(config.server_endpoint.trim())
            .map_err(|e| SourceError::Config(format!("invalid server endpoint: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .tcp_keepalive(Duration::from_secs(config.keep_alive_secs))
            .connect_timeout(Duration::from_secs(config.tls_handshake_timeout_secs))
            .danger_accept_invalid_certs(config.tls_insecure_skip_verify);

        if let Some(path) = &config.root_ca_path {
            let pem = std::fs::read(path)
                .map_err(|e| SourceError::Config(format!("failed to read {}: {e}", path.display())))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| SourceError::Config(format!("invalid root CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert_path, &config.client_key_path) {
            let mut pem = std::fs::read(cert_path)
                .map_err(|e| SourceError::Config(format!("failed to read {}: {e}", cert_path.display())))?;
            let key = std::fs::read(key_path)
                .map_err(|e| SourceError::Config(format!("failed to read {}: {e}", key_path.display())))?;
            pem.push(b'\n');
            pem.extend_from_slice(&key);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| SourceError::Config(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            auth: config.auth.clone(),
            org_id: config.header_x_scope_org_id.clone(),
            retry: config.rate_limit_retry.clone(),
            permits: Arc::new(Semaphore::new(config.query_concurrency.max(1))),
        })
    }

    /// Build an authenticated GET request against `path`.
    pub fn build_request(&self, path: &str, params: &[(&str, String)]) -> SourceResult<Request> {
        let url = self
            .base
            .join(path)
            .map_err(|e| SourceError::Config(format!("invalid query path {path}: {e}")))?;

        let mut request = self.http.get(url).query(params);

        if !self.auth.bearer_token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.auth.bearer_token))
                .map_err(|e| SourceError::Config(format!("invalid bearer token: {e}")))?;
            request = request.header(AUTHORIZATION, value);
        } else if !self.auth.username.is_empty() {
            request = request.basic_auth(&self.auth.username, Some(&self.auth.password));
        }

        if !self.org_id.is_empty() {
            request = request.header(HEADER_X_SCOPE_ORG_ID, &self.org_id);
        }

        request
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))
    }

    /// Instant query evaluated at `time`.
    pub async fn query(&self, promql: &str, time: DateTime<Utc>, keys: SeriesKeys) -> QueryResponse {
        let params = [
            ("query", promql.to_string()),
            ("time", time.timestamp().to_string()),
        ];
        let data = self.execute("api/v1/query", &params).await?;
        Ok(to_results(data, keys))
    }

    /// Range query sampled every `step` over `[start, end]`.
    pub async fn query_range(
        &self,
        promql: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        keys: SeriesKeys,
    ) -> QueryResponse {
        let params = [
            ("query", promql.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", format!("{}s", step.as_secs().max(1))),
        ];
        let data = self.execute("api/v1/query_range", &params).await?;
        Ok(to_results(data, keys))
    }

    async fn execute(&self, path: &str, params: &[(&str, String)]) -> SourceResult<ApiData> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SourceError::Cancelled)?;

        let mut retries = 0u32;
        loop {
            let request = self.build_request(path, params)?;
            let response = self
                .http
                .execute(request)
                .await
                .map_err(|e| SourceError::Request(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
                if let Some(retry) = &self.retry {
                    if retries >= retry.max_retries {
                        return Err(SourceError::RateLimited { retries });
                    }
                    let wait = retry_after(response.headers().get(RETRY_AFTER))
                        .unwrap_or(Duration::from_secs(retry.default_wait_secs));
                    retries += 1;
                    debug!(retries, wait_secs = wait.as_secs(), "Rate limited, retrying query");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            }

            let body = response
                .text()
                .await
                .map_err(|e| SourceError::Request(e.to_string()))?;

            // Query errors come back as 400/422 with a JSON error payload
            let parsed: Result<ApiResponse, _> = serde_json::from_str(&body);
            return match parsed {
                Ok(api) if api.status == "success" => {
                    for warning in &api.warnings {
                        warn!(warning = %warning, "Prometheus query warning");
                    }
                    api.data
                        .ok_or_else(|| SourceError::Decode("success response without data".to_string()))
                }
                Ok(api) => Err(SourceError::Query {
                    error_type: api.error_type.unwrap_or_default(),
                    message: api.error.unwrap_or_default(),
                }),
                Err(_) if !status.is_success() => Err(SourceError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, MAX_ERROR_BODY),
                }),
                Err(e) => Err(SourceError::Decode(e.to_string())),
            };
        }
    }
}

fn retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

fn to_results(data: ApiData, keys: SeriesKeys) -> Vec<QueryResult> {
    match data {
        ApiData::Matrix(series) => series
            .into_iter()
            .map(|s| to_result(s.metric, &s.values, keys))
            .collect(),
        ApiData::Vector(samples) => samples
            .into_iter()
            .map(|s| to_result(s.metric, std::slice::from_ref(&s.value), keys))
            .collect(),
        ApiData::Scalar(sample) | ApiData::String(sample) => {
            vec![to_result(BTreeMap::new(), std::slice::from_ref(&sample), keys)]
        }
    }
}

fn to_result(metric: BTreeMap<String, String>, values: &[(f64, String)], keys: SeriesKeys) -> QueryResult {
    let mut result = QueryResult::default();

    for (label, value) in metric {
        let mut identifying = false;
        if label == keys.uid {
            result.uid = value.clone();
            identifying = true;
        }
        if label == keys.name {
            result.name = value.clone();
            identifying = true;
        }

        if label == "namespace" {
            result.namespace = value;
        } else if label == "resourcequota" {
            result.resource_quota = value;
        } else if identifying {
            continue;
        } else if let Some(key) = label.strip_prefix(LABEL_PREFIX) {
            result.labels.insert(key.to_string(), value);
        } else if let Some(key) = label.strip_prefix(ANNOTATION_PREFIX) {
            result.annotations.insert(key.to_string(), value);
        } else if label != "__name__" {
            result.attributes.insert(label, value);
        }
    }

    result.data = values
        .iter()
        .filter_map(|(ts, raw)| {
            let value = raw.parse::<f64>().ok().filter(|v| v.is_finite())?;
            let timestamp = Utc.timestamp_millis_opt((ts * 1000.0).round() as i64).single()?;
            Some(DataPoint::new(timestamp, value))
        })
        .collect();

    result
}
