//! Tests for storage backends

use super::*;
use chrono::TimeZone;
use mockito::Matcher;
use reqwest::Method;
use tempfile::TempDir;
use url::Url;

#[test]
fn test_normalize_path() {
    assert_eq!(normalize_path("/a//b/./c/").unwrap(), "a/b/c");
    assert_eq!(normalize_path("").unwrap(), "");
    assert!(normalize_path("a/../b").is_err());
    assert!(normalize_path("a\\b").is_err());
    assert!(object_path("/").is_err());
}

#[tokio::test]
async fn test_file_storage_roundtrip() {
    let dir = TempDir::new().unwrap();
    let storage = FileStorage::new(dir.path());

    assert!(!storage.exists("cluster/kubemodel/1h/a.bin").await.unwrap());
    storage.put("cluster/kubemodel/1h/a.bin", b"first").await.unwrap();
    storage.put("cluster/kubemodel/1h/a.bin", b"second").await.unwrap();

    assert!(storage.exists("cluster/kubemodel/1h/a.bin").await.unwrap());
    assert_eq!(storage.get("cluster/kubemodel/1h/a.bin").await.unwrap(), b"second");
    assert!(dir.path().join("cluster/kubemodel/1h/a.bin").is_file());

    storage.delete("cluster/kubemodel/1h/a.bin").await.unwrap();
    assert!(matches!(
        storage.get("cluster/kubemodel/1h/a.bin").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        storage.delete("cluster/kubemodel/1h/a.bin").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_file_storage_list() {
    let dir = TempDir::new().unwrap();
    let storage = FileStorage::new(dir.path());

    storage.put("res/b.bin", b"bb").await.unwrap();
    storage.put("res/a.bin", b"a").await.unwrap();
    storage.put("res/nested/c.bin", b"c").await.unwrap();
    std::fs::write(dir.path().join("res/.a.bin.tmp-1-0"), b"partial").unwrap();

    let files = storage.list("res").await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.bin", "b.bin"]);
    assert_eq!(files[1].size, 2);
    assert!(files[0].modified.is_some());

    assert!(storage.list("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_storage_rejects_escape() {
    let dir = TempDir::new().unwrap();
    let storage = FileStorage::new(dir.path());
    assert!(matches!(
        storage.put("../outside.bin", b"x").await,
        Err(StorageError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_memory_storage_lists_direct_children() {
    let storage = MemoryStorage::new();
    storage.put("a/x.bin", b"1").await.unwrap();
    storage.put("a/b/y.bin", b"22").await.unwrap();
    storage.put("ab/z.bin", b"3").await.unwrap();

    let names: Vec<_> = storage
        .list("a")
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["x.bin"]);
    assert_eq!(storage.len().await, 3);
    assert!(storage.exists("/a/b/y.bin").await.unwrap());
}

#[test]
fn test_storage_config_tagged() {
    let config: StorageConfig = serde_json::from_str(r#"{"type":"memory"}"#).unwrap();
    assert_eq!(config, StorageConfig::Memory);

    let config: StorageConfig =
        serde_json::from_str(r#"{"type":"cluster","host":"cluster-storage","port":9443}"#).unwrap();
    match &config {
        StorageConfig::Cluster(c) => {
            assert_eq!(c.host, "cluster-storage");
            assert_eq!(c.port, 9443);
            assert_eq!(c.timeout_secs, 60);
        }
        other => panic!("unexpected config {other:?}"),
    }
    assert_eq!(config.build().unwrap().storage_type(), StorageType::Cluster);

    let config: StorageConfig = serde_json::from_str(r#"{"type":"file","root":"/tmp/km"}"#).unwrap();
    assert_eq!(config.build().unwrap().storage_type(), StorageType::File);
}

#[test]
fn test_cluster_storage_scheme() {
    let mut config = ClusterStorageConfig::default();
    assert_eq!(config.scheme(), "http");

    config.tls = Some(ClusterTlsConfig::default());
    assert_eq!(config.scheme(), "https");

    config.tls = Some(ClusterTlsConfig {
        insecure_skip_verify: true,
        root_ca_path: None,
    });
    assert_eq!(config.scheme(), "http");

    config.host = String::new();
    assert!(ClusterStorage::new(config).is_err());
}

fn cluster_storage(server: &mockito::ServerGuard) -> ClusterStorage {
    let address = server.host_with_port();
    let (host, port) = address.rsplit_once(':').unwrap();
    ClusterStorage::new(ClusterStorageConfig {
        host: host.to_string(),
        port: port.parse().unwrap(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_cluster_storage_put_and_get() {
    let mut server = mockito::Server::new_async().await;
    let write = server
        .mock("PUT", "/clusterStorage/write")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel/1h/a.bin".into()))
        .match_body("payload")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/clusterStorage/read")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel/1h/a.bin".into()))
        .with_status(200)
        .with_body("payload")
        .create_async()
        .await;
    server
        .mock("GET", "/clusterStorage/read")
        .match_query(Matcher::UrlEncoded("path".into(), "missing.bin".into()))
        .with_status(404)
        .create_async()
        .await;

    let storage = cluster_storage(&server);
    storage.put("/c/kubemodel/1h/a.bin", b"payload").await.unwrap();
    write.assert_async().await;

    assert_eq!(storage.get("c/kubemodel/1h/a.bin").await.unwrap(), b"payload");
    assert!(matches!(
        storage.get("missing.bin").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cluster_storage_list_and_exists() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/clusterStorage/list")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel".into()))
        .with_status(200)
        .with_body(r#"{"code":200,"data":[{"name":"a.bin","size":12,"modTime":"2024-01-01T00:00:00Z"}]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/clusterStorage/exists")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel/a.bin".into()))
        .with_status(200)
        .with_body(r#"{"code":200,"data":true}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/clusterStorage/exists")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel/b.bin".into()))
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/clusterStorage/exists")
        .match_query(Matcher::UrlEncoded("path".into(), "c/kubemodel/c.bin".into()))
        .with_status(404)
        .create_async()
        .await;

    let storage = cluster_storage(&server);
    let files = storage.list("c/kubemodel").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "a.bin");
    assert_eq!(files[0].size, 12);
    assert_eq!(files[0].modified, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));

    assert!(storage.exists("c/kubemodel/a.bin").await.unwrap());
    assert!(matches!(
        storage.exists("c/kubemodel/b.bin").await,
        Err(StorageError::Http { status: 500, .. })
    ));
    // A 404 from the service means the object is absent
    assert!(!storage.exists("c/kubemodel/c.bin").await.unwrap());
}

fn s3_config(endpoint: &str, insecure: bool) -> S3StorageConfig {
    S3StorageConfig {
        endpoint: endpoint.to_string(),
        bucket: "kubemodel".to_string(),
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        insecure,
        ..Default::default()
    }
}

#[test]
fn test_s3_protocol() {
    let storage = S3Storage::new(s3_config("s3.example.com", false)).unwrap();
    assert_eq!(storage.protocol(), "HTTPS");

    let storage = S3Storage::new(s3_config("minio:9000", true)).unwrap();
    assert_eq!(storage.protocol(), "HTTP");

    let mut config = s3_config("minio:9000", true);
    config.bucket = String::new();
    assert!(S3Storage::new(config).is_err());
}

#[test]
fn test_sigv4_authorization_header() {
    let signer = SigV4Signer::new("AKIDEXAMPLE", "secret", "eu-west-1");
    let url = Url::parse("http://minio:9000/kubemodel/c/a.bin").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();

    let headers = signer.sign(&Method::PUT, &url, b"payload", now).unwrap();
    let get = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };

    assert_eq!(get("x-amz-date"), "20240101T123000Z");
    assert_eq!(get("x-amz-content-sha256").len(), 64);

    let auth = get("authorization");
    assert!(auth.starts_with(
        "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/eu-west-1/s3/aws4_request, \
         SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
    ));
    let signature = auth.rsplit("Signature=").next().unwrap();
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));

    // Deterministic for identical input, sensitive to the payload
    let again = signer.sign(&Method::PUT, &url, b"payload", now).unwrap();
    assert_eq!(headers, again);
    let other = signer.sign(&Method::PUT, &url, b"other", now).unwrap();
    assert_ne!(headers[2], other[2]);
}

#[tokio::test]
async fn test_s3_put_is_signed() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/kubemodel/c/kubemodel/1h/a.bin")
        .match_header(
            "authorization",
            Matcher::Regex(r"^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/\d{8}/us-east-1/s3/aws4_request".into()),
        )
        .match_header("x-amz-content-sha256", Matcher::Regex("^[0-9a-f]{64}$".into()))
        .match_body("data")
        .with_status(200)
        .create_async()
        .await;

    let storage = S3Storage::new(s3_config(&server.host_with_port(), true)).unwrap();
    storage.put("c/kubemodel/1h/a.bin", b"data").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_s3_exists_via_head() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/kubemodel/c/present.bin")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("HEAD", "/kubemodel/c/absent.bin")
        .with_status(404)
        .create_async()
        .await;

    let storage = S3Storage::new(s3_config(&server.host_with_port(), true)).unwrap();
    assert!(storage.exists("c/present.bin").await.unwrap());
    assert!(!storage.exists("c/absent.bin").await.unwrap());
}

#[tokio::test]
async fn test_s3_list_follows_continuation() {
    let mut server = mockito::Server::new_async().await;
    let first = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>c/kubemodel/a.bin</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><Size>10</Size></Contents>
  <NextContinuationToken>page-2</NextContinuationToken>
</ListBucketResult>"#;
    let second = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>c/kubemodel/b&amp;c.bin</Key><Size>20</Size></Contents>
</ListBucketResult>"#;

    server
        .mock("GET", "/kubemodel")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("list-type".into(), "2".into()),
            Matcher::UrlEncoded("prefix".into(), "c/kubemodel/".into()),
            Matcher::UrlEncoded("continuation-token".into(), "page-2".into()),
        ]))
        .with_status(200)
        .with_body(second)
        .create_async()
        .await;
    server
        .mock("GET", "/kubemodel")
        .match_query(Matcher::Regex(
            "^list-type=2&prefix=c%2Fkubemodel%2F&delimiter=%2F$".into(),
        ))
        .with_status(200)
        .with_body(first)
        .create_async()
        .await;

    let storage = S3Storage::new(s3_config(&server.host_with_port(), true)).unwrap();
    let files = storage.list("c/kubemodel").await.unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "a.bin");
    assert_eq!(files[0].size, 10);
    assert!(files[0].modified.is_some());
    assert_eq!(files[1].name, "b&c.bin");
    assert_eq!(files[1].modified, None);
}
