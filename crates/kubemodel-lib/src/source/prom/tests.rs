//! Tests for the Prometheus client and source

use super::*;
use crate::error::SourceError;
use crate::model::{Resource, StatType};
use crate::source::{MetricsSource, QuotaBound, QuotaSection, ResourceQuotaQuery};
use chrono::{TimeZone, Utc};
use mockito::Matcher;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;

const NS_KEYS: SeriesKeys = SeriesKeys::new("uid", "namespace");

fn config(endpoint: &str) -> PrometheusConfig {
    PrometheusConfig::new(endpoint)
}

#[test]
fn test_config_requires_endpoint() {
    let err = PrometheusConfig::default().validate().unwrap_err();
    assert!(matches!(err, SourceError::Config(msg) if msg.contains("no address for prometheus")));
    assert!(PrometheusClient::new(&PrometheusConfig::default()).is_err());
}

#[test]
fn test_config_rejects_zero_timeout() {
    let mut cfg = config("http://prometheus:9090");
    cfg.timeout_secs = 0;
    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, SourceError::Config(msg) if msg.contains("timeout_secs")));
    assert!(PrometheusClient::new(&cfg).is_err());
}

#[test]
fn test_config_rejects_half_mtls() {
    let mut cfg = config("http://prometheus:9090");
    cfg.client_cert_path = Some("/etc/certs/client.pem".into());
    assert!(cfg.validate().is_err());
}

#[test]
fn test_data_resolution_floors_to_minutes() {
    let mut cfg = config("http://prometheus:9090");
    cfg.resolution_secs = 150;
    assert_eq!(cfg.data_resolution(), Duration::from_secs(120));

    cfg.resolution_secs = 10;
    assert_eq!(cfg.data_resolution(), Duration::from_secs(60));
}

#[test]
fn test_cluster_matcher() {
    let mut cfg = config("http://prometheus:9090");
    assert_eq!(cfg.cluster_matcher(), None);

    cfg.cluster_id = "prod".to_string();
    assert_eq!(cfg.cluster_matcher().as_deref(), Some("cluster_id=\"prod\""));

    cfg.cluster_filter = "env=~\"prod|stage\"".to_string();
    assert_eq!(cfg.cluster_matcher().as_deref(), Some("env=~\"prod|stage\""));
}

#[test]
fn test_bearer_token_header() {
    let mut cfg = config("http://prometheus:9090");
    cfg.auth.bearer_token = "abc123".to_string();
    cfg.auth.username = "ignored".to_string();
    let client = PrometheusClient::new(&cfg).unwrap();

    let request = client.build_request("api/v1/query", &[("query", "up".to_string())]).unwrap();
    assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer abc123");
    assert_eq!(request.url().path(), "/api/v1/query");
}

#[test]
fn test_no_auth_header_without_credentials() {
    let client = PrometheusClient::new(&config("http://prometheus:9090")).unwrap();
    let request = client.build_request("api/v1/query", &[]).unwrap();
    assert!(request.headers().get(AUTHORIZATION).is_none());
    assert!(request.headers().get(HEADER_X_SCOPE_ORG_ID).is_none());
}

#[test]
fn test_basic_auth_and_tenant_header() {
    let mut cfg = config("http://prometheus:9090");
    cfg.auth.username = "user".to_string();
    cfg.auth.password = "pass".to_string();
    cfg.header_x_scope_org_id = "tenant-a".to_string();
    let client = PrometheusClient::new(&cfg).unwrap();

    let request = client.build_request("api/v1/query", &[]).unwrap();
    let auth = request.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
    assert!(auth.starts_with("Basic "));
    assert_eq!(request.headers().get(HEADER_X_SCOPE_ORG_ID).unwrap(), "tenant-a");
}

#[tokio::test]
async fn test_query_range_parses_matrix() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"{
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [{
                "metric": {
                    "__name__": "kube_namespace_labels",
                    "namespace": "default",
                    "uid": "ns-1",
                    "label_team": "core",
                    "annotation_owner": "ops",
                    "cluster_id": "prod"
                },
                "values": [[1704067200, "1"], [1704067500, "NaN"], [1704067800, "2.5"]]
            }]
        }
    }"#;
    let mock = server
        .mock("GET", "/api/v1/query_range")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("start".into(), "1704067200".into()),
            Matcher::UrlEncoded("step".into(), "300s".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let client = PrometheusClient::new(&config(&server.url())).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();

    let results = client
        .query_range("kube_namespace_labels", start, end, Duration::from_secs(300), NS_KEYS)
        .await
        .unwrap();
    mock.assert_async().await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.uid, "ns-1");
    assert_eq!(result.name, "default");
    assert_eq!(result.namespace, "default");
    assert_eq!(result.labels.get("team").map(String::as_str), Some("core"));
    assert_eq!(result.annotations.get("owner").map(String::as_str), Some("ops"));
    assert_eq!(result.attribute("cluster_id"), Some("prod"));
    assert!(!result.attributes.contains_key("__name__"));
    // NaN samples are dropped
    assert_eq!(result.data.len(), 2);
    assert_eq!(result.data[0].timestamp, start);
    assert_eq!(result.data[1].value, 2.5);
}

#[tokio::test]
async fn test_query_parses_vector() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"{"status":"success","data":{"resultType":"vector","result":[
        {"metric":{"namespace":"team-a","resourcequota":"compute","uid":"rq-1"},"value":[1704070800,"0.5"]}
    ]}}"#;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let client = PrometheusClient::new(&config(&server.url())).unwrap();
    let keys = SeriesKeys::new("uid", "resourcequota");
    let results = client.query("q", Utc::now(), keys).await.unwrap();

    assert_eq!(results[0].uid, "rq-1");
    assert_eq!(results[0].name, "compute");
    assert_eq!(results[0].resource_quota, "compute");
    assert_eq!(results[0].value(), Some(0.5));
}

#[tokio::test]
async fn test_query_error_payload() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
        .create_async()
        .await;

    let client = PrometheusClient::new(&config(&server.url())).unwrap();
    let err = client.query("sum(", Utc::now(), NS_KEYS).await.unwrap_err();
    assert_eq!(
        err,
        SourceError::Query {
            error_type: "bad_data".to_string(),
            message: "parse error".to_string(),
        }
    );
}

#[tokio::test]
async fn test_non_json_failure_reports_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let client = PrometheusClient::new(&config(&server.url())).unwrap();
    let err = client.query("up", Utc::now(), NS_KEYS).await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_rate_limit_retries_exhausted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(3)
        .create_async()
        .await;

    let mut cfg = config(&server.url());
    cfg.rate_limit_retry = Some(RateLimitRetry {
        max_retries: 2,
        default_wait_secs: 0,
    });
    let client = PrometheusClient::new(&cfg).unwrap();

    let err = client.query("up", Utc::now(), NS_KEYS).await.unwrap_err();
    assert_eq!(err, SourceError::RateLimited { retries: 2 });
    mock.assert_async().await;
}

#[test]
fn test_selector_appends_cluster_matcher() {
    let mut cfg = config("http://prometheus:9090");
    let source = PrometheusSource::new(&cfg).unwrap();
    assert_eq!(source.selector(&[]), "");
    assert_eq!(source.selector(&["type=\"hard\""]), "{type=\"hard\"}");

    cfg.cluster_id = "prod".to_string();
    let source = PrometheusSource::new(&cfg).unwrap();
    assert_eq!(source.selector(&[]), "{cluster_id=\"prod\"}");
    assert_eq!(
        source.selector(&["type=\"hard\""]),
        "{type=\"hard\", cluster_id=\"prod\"}"
    );
}

#[test]
fn test_resource_quota_promql() {
    let source = PrometheusSource::new(&config("http://prometheus:9090")).unwrap();
    let query = ResourceQuotaQuery {
        section: QuotaSection::StatusUsed,
        bound: QuotaBound::Limits,
        resource: Resource::Memory,
        stat: StatType::Max,
    };
    let promql = source.resource_quota_promql(&query, "3600s");
    assert!(promql.contains("max_over_time(kube_resourcequota{resource=\"limits.memory\", type=\"used\"}[3600s])"));
    assert!(promql.contains("group_left(uid)"));
}

#[tokio::test]
async fn test_source_cluster_uptime_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/query_range")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded(
                "query".into(),
                "group(kube_namespace_created{namespace=\"kube-system\"}) by (namespace, uid)".into(),
            ),
            Matcher::UrlEncoded("start".into(), "1704067200".into()),
            // Last sample starts one resolution before the window end
            Matcher::UrlEncoded("end".into(), "1704070500".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{"namespace":"kube-system","uid":"cluster-uid"},"values":[[1704067200,"1"]]}
        ]}}"#)
        .create_async()
        .await;

    let source = PrometheusSource::new(&config(&server.url())).unwrap();
    assert_eq!(source.resolution(), Duration::from_secs(300));

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
    let results = source.query_cluster_uptime(start, end).await.unwrap();
    mock.assert_async().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].uid, "cluster-uid");
}
