//! S3-compatible object storage with AWS Signature Version 4

use super::{normalize_path, object_path, Storage, StorageInfo, StorageType};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3StorageConfig {
    /// Host and optional port of the S3 endpoint, without scheme.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Talk plain HTTP instead of HTTPS.
    pub insecure: bool,
    pub timeout_secs: u64,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "s3.amazonaws.com".to_string(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            insecure: false,
            timeout_secs: 60,
        }
    }
}

/// Signs requests with AWS Signature Version 4 headers.
#[derive(Clone)]
pub struct SigV4Signer {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Headers to attach to a request: `x-amz-date`,
    /// `x-amz-content-sha256` and `authorization`.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<(&'static str, String)>> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(payload));

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StorageError::Config(format!("URL without host: {url}"))),
        };

        let canonical_request = format!(
            "{method}\n{}\n{}\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
            url.path(),
            canonical_query(url),
        );

        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(format!("AWS4{}", self.secret_access_key).as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.access_key_id
        );

        Ok(vec![
            ("x-amz-date", amz_date),
            ("x-amz-content-sha256", payload_hash),
            ("authorization", authorization),
        ])
    }
}

fn hmac(key: &[u8], data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Config(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding as required by SigV4. `/` is kept in paths.
fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, false), uri_encode(&v, false)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// S3 client using path-style addressing.
#[derive(Debug, Clone)]
pub struct S3Storage {
    config: S3StorageConfig,
    signer: SigV4Signer,
    client: reqwest::Client,
}

impl S3Storage {
    pub fn new(config: S3StorageConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("s3 bucket is required".to_string()));
        }
        if config.endpoint.is_empty() {
            return Err(StorageError::Config("s3 endpoint is required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;
        let signer = SigV4Signer::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            config.region.clone(),
        );

        let storage = Self { config, signer, client };
        info!(
            protocol = storage.protocol(),
            endpoint = %storage.config.endpoint,
            bucket = %storage.config.bucket,
            "Configured S3 storage"
        );
        Ok(storage)
    }

    /// Transport protocol label.
    pub fn protocol(&self) -> &'static str {
        if self.config.insecure {
            "HTTP"
        } else {
            "HTTPS"
        }
    }

    fn url(&self, key: &str, query: &[(&str, &str)]) -> StorageResult<Url> {
        let scheme = if self.config.insecure { "http" } else { "https" };
        let mut raw = format!("{scheme}://{}/{}", self.config.endpoint, uri_encode(&self.config.bucket, false));
        if !key.is_empty() {
            raw.push('/');
            raw.push_str(&uri_encode(key, true));
        }
        let mut url = Url::parse(&raw).map_err(|e| StorageError::Config(format!("invalid S3 URL {raw}: {e}")))?;
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
                .collect();
            url.set_query(Some(&encoded.join("&")));
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Vec<u8>, path: &str) -> StorageResult<reqwest::Response> {
        let headers = self.signer.sign(&method, &url, &body, Utc::now())?;
        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !body.is_empty() {
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
}

#[async_trait]
impl Storage for S3Storage {
    fn storage_type(&self) -> StorageType {
        StorageType::S3
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let key = object_path(path)?;
        let url = self.url(&key, &[])?;
        self.send(Method::PUT, url, data.to_vec(), &key).await?;
        debug!(key = %key, bytes = data.len(), "Uploaded S3 object");
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = object_path(path)?;
        let url = self.url(&key, &[])?;
        let response = self.send(Method::GET, url, Vec::new(), &key).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<StorageInfo>> {
        let dir = normalize_path(dir)?;
        let prefix = if dir.is_empty() { dir } else { format!("{dir}/") };

        let mut files = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut query = vec![("list-type", "2"), ("prefix", prefix.as_str()), ("delimiter", "/")];
            if let Some(token) = continuation.as_deref() {
                query.push(("continuation-token", token));
            }
            let url = self.url("", &query)?;
            let body = self.send(Method::GET, url, Vec::new(), &prefix).await?.text().await?;

            for contents in xml_blocks(&body, "Contents") {
                let Some(key) = xml_value(contents, "Key") else {
                    continue;
                };
                let Some(name) = key.strip_prefix(&prefix).filter(|n| !n.is_empty()) else {
                    continue;
                };
                files.push(StorageInfo {
                    name: name.to_string(),
                    size: xml_value(contents, "Size")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_default(),
                    modified: xml_value(contents, "LastModified")
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|t| t.with_timezone(&Utc)),
                });
            }

            let truncated = xml_value(&body, "IsTruncated").as_deref() == Some("true");
            continuation = xml_value(&body, "NextContinuationToken");
            if !truncated || continuation.is_none() {
                break;
            }
        }

        Ok(files)
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = object_path(path)?;
        let url = self.url(&key, &[])?;
        self.send(Method::DELETE, url, Vec::new(), &key).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let key = object_path(path)?;
        let url = self.url(&key, &[])?;
        match self.send(Method::HEAD, url, Vec::new(), &key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Bodies of every `<tag>...</tag>` element, in document order.
fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        blocks.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    blocks
}

/// Unescaped text of the first `<tag>` element.
fn xml_value(xml: &str, tag: &str) -> Option<String> {
    xml_blocks(xml, tag).first().map(|raw| {
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    })
}

#[cfg(test)]
mod xml_tests {
    use super::*;

    #[test]
    fn test_xml_value_unescapes() {
        let xml = "<Key>a&amp;b&lt;c</Key><Key>second</Key>";
        assert_eq!(xml_value(xml, "Key").as_deref(), Some("a&b<c"));
        assert_eq!(xml_blocks(xml, "Key").len(), 2);
        assert_eq!(xml_value(xml, "Size"), None);
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("a b/c~d", true), "a%20b/c~d");
        assert_eq!(uri_encode("a/b", false), "a%2Fb");
        assert_eq!(uri_encode("2024-01-01T00:00:00Z.bin", true), "2024-01-01T00%3A00%3A00Z.bin");
    }
}
