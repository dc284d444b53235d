//! Tests for the compute pipeline against a scripted metrics source

use super::*;
use crate::model::{OwnerKind, Resource, ServiceType, StatType, Unit};
use crate::source::{
    ContainerMeasure, ContainerMetric, DataPoint, NodeMetric, PodMetric, QueryResponse,
    QueryResult, ResourceQuotaQuery, ServiceMetric,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone};
use std::collections::{BTreeMap, HashMap};

const RESOLUTION: Duration = Duration::from_secs(300);

/// Metrics source answering from a table keyed by query label.
#[derive(Default)]
struct ScriptedSource {
    responses: HashMap<String, QueryResponse>,
    hang: bool,
}

impl ScriptedSource {
    fn with(mut self, label: impl Into<String>, response: QueryResponse) -> Self {
        self.responses.insert(label.into(), response);
        self
    }

    async fn respond(&self, label: &str) -> QueryResponse {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.responses.get(label).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    fn resolution(&self) -> Duration {
        RESOLUTION
    }

    async fn query_cluster_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("cluster_uptime").await
    }

    async fn query_namespace_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("namespace_uptime").await
    }

    async fn query_namespace_labels(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("namespace_labels").await
    }

    async fn query_namespace_annotations(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("namespace_annotations").await
    }

    async fn query_resource_quota_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("resource_quota_uptime").await
    }

    async fn query_resource_quota(
        &self,
        query: ResourceQuotaQuery,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> QueryResponse {
        self.respond(&query.name()).await
    }

    async fn query_node_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("node_uptime").await
    }

    async fn query_node_labels(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("node_labels").await
    }

    async fn query_node_metric(&self, metric: NodeMetric, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond(metric.name()).await
    }

    async fn query_owner_info(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("owner_info").await
    }

    async fn query_owner_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("owner_uptime").await
    }

    async fn query_pod_info(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("pod_info").await
    }

    async fn query_pod_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("pod_uptime").await
    }

    async fn query_pod_metric(&self, metric: PodMetric, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond(metric.name()).await
    }

    async fn query_container_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("container_uptime").await
    }

    async fn query_container_metric(
        &self,
        metric: ContainerMetric,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> QueryResponse {
        self.respond(&metric.name()).await
    }

    async fn query_service_info(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("service_info").await
    }

    async fn query_service_ports(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("service_ports").await
    }

    async fn query_service_uptime(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> QueryResponse {
        self.respond("service_uptime").await
    }

    async fn query_service_metric(
        &self,
        metric: ServiceMetric,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> QueryResponse {
        self.respond(metric.name()).await
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    (t0(), t0() + ChronoDuration::hours(1))
}

/// Samples at every resolution step of the hour window.
fn full_uptime(uid: &str) -> QueryResult {
    QueryResult {
        uid: uid.to_string(),
        data: (0..12)
            .map(|i| DataPoint::new(t0() + ChronoDuration::minutes(i * 5), 1.0))
            .collect(),
        ..Default::default()
    }
}

fn value_result(uid: &str, value: f64) -> QueryResult {
    QueryResult {
        uid: uid.to_string(),
        data: vec![DataPoint::new(t0(), value)],
        ..Default::default()
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn model(source: ScriptedSource) -> KubeModel {
    let identity = ClusterIdentity {
        uid: "c1".to_string(),
        name: "prod".to_string(),
        ..Default::default()
    };
    KubeModel::new(identity, Arc::new(source)).unwrap()
}

#[test]
fn test_new_requires_cluster_uid() {
    let err = KubeModel::new(ClusterIdentity::default(), Arc::new(ScriptedSource::default())).unwrap_err();
    assert!(matches!(err, ComputeError::Config(_)));
}

#[tokio::test]
async fn test_invalid_window() {
    let km = model(ScriptedSource::default());
    let err = km
        .compute_kube_model_set(t0(), t0(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ComputeError::InvalidWindow { .. }));
}

#[tokio::test]
async fn test_cluster_and_namespace_without_uptime() {
    let ns_labels = QueryResult {
        uid: "n1".to_string(),
        namespace: "default".to_string(),
        labels: labels(&[("app", "x")]),
        ..Default::default()
    };
    let source = ScriptedSource::default()
        .with("cluster_uptime", Ok(vec![full_uptime("c1")]))
        .with("namespace_labels", Ok(vec![ns_labels]));

    let (start, end) = window();
    let set = model(source)
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();

    let cluster = set.cluster.as_ref().unwrap();
    assert_eq!(cluster.uid, "c1");
    assert_eq!(cluster.name, "prod");
    assert_eq!(cluster.start, Some(start));
    assert_eq!(cluster.end, Some(end));

    let ns = &set.namespaces["n1"];
    assert_eq!(ns.name, "default");
    assert_eq!(ns.cluster_uid, "c1");
    assert_eq!(ns.labels, labels(&[("app", "x")]));
    assert_eq!(ns.start, None);
    assert_eq!(ns.end, None);

    assert_eq!(set.get_warnings().len(), 1);
    assert!(set.get_errors().is_empty());
    assert!(set.metadata.completed_at.is_some());
}

#[tokio::test]
async fn test_resource_quota_cpu_in_millicores() {
    let spec_cpu_avg = ResourceQuotaQuery::all()
        .into_iter()
        .find(|q| q.name() == "spec_hard_requests_cpu_avg")
        .unwrap();
    let spec_memory_max = ResourceQuotaQuery::all()
        .into_iter()
        .find(|q| q.name() == "spec_hard_requests_memory_max")
        .unwrap();

    let mut rq = value_result("rq1", 0.5);
    rq.resource_quota = "rq1".to_string();
    rq.namespace = "default".to_string();
    let mut rq_memory = value_result("rq1", 1_073_741_824.0);
    rq_memory.resource_quota = "rq1".to_string();
    rq_memory.namespace = "default".to_string();

    let ns = QueryResult {
        uid: "n1".to_string(),
        namespace: "default".to_string(),
        ..Default::default()
    };

    let source = ScriptedSource::default()
        .with("cluster_uptime", Ok(vec![full_uptime("c1")]))
        .with("namespace_labels", Ok(vec![ns]))
        .with("namespace_uptime", Ok(vec![full_uptime("n1")]))
        .with("resource_quota_uptime", Ok(vec![full_uptime("rq1")]))
        .with(spec_cpu_avg.name(), Ok(vec![rq]))
        .with(spec_memory_max.name(), Ok(vec![rq_memory]));

    let (start, end) = window();
    let set = model(source)
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();

    let quota = &set.resource_quotas["rq1"];
    assert_eq!(quota.name, "rq1");
    assert_eq!(quota.namespace_uid, "n1");
    assert_eq!(quota.start, Some(start));

    let cpu = quota.spec.hard.requests.get(Resource::Cpu).unwrap();
    assert_eq!(cpu.unit, Unit::Millicore);
    assert_eq!(cpu.values.get(StatType::Avg), Some(500.0));

    let memory = quota.spec.hard.requests.get(Resource::Memory).unwrap();
    assert_eq!(memory.unit, Unit::Byte);
    assert_eq!(memory.values.get(StatType::Max), Some(1_073_741_824.0));

    assert!(quota.status.used.requests.is_empty());
    assert!(set.get_warnings().is_empty(), "{:?}", set.get_warnings());
}

#[tokio::test]
async fn test_failed_annotation_query_is_absorbed() {
    let ns = QueryResult {
        uid: "n1".to_string(),
        namespace: "default".to_string(),
        labels: labels(&[("team", "core")]),
        ..Default::default()
    };
    let source = ScriptedSource::default()
        .with("cluster_uptime", Ok(vec![full_uptime("c1")]))
        .with("namespace_uptime", Ok(vec![full_uptime("n1")]))
        .with("namespace_labels", Ok(vec![ns]))
        .with(
            "namespace_annotations",
            Err(SourceError::Request("connection reset".to_string())),
        );

    let (start, end) = window();
    let set = model(source)
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();

    let ns = &set.namespaces["n1"];
    assert_eq!(ns.labels, labels(&[("team", "core")]));
    assert!(ns.annotations.is_empty());

    let warnings = set.get_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("namespace_annotations"));
}

#[tokio::test]
async fn test_cluster_count_mismatch_is_an_error_diagnostic() {
    let source = ScriptedSource::default()
        .with("cluster_uptime", Ok(vec![full_uptime("c1"), full_uptime("c2")]));

    let (start, end) = window();
    let set = model(source)
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();

    let errors = set.get_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "2 clusters returning from cluster uptime query");
    // The configured cluster still gets its bounds
    assert_eq!(set.cluster.as_ref().unwrap().start, Some(start));
}

#[tokio::test]
async fn test_workload_phases_link_entities() {
    let cpu_usage_max = ContainerMetric {
        resource: Resource::Cpu,
        measure: ContainerMeasure::UsageMax,
    };

    let ns = QueryResult {
        uid: "n1".to_string(),
        namespace: "default".to_string(),
        ..Default::default()
    };
    let mut node = QueryResult::new("node-1");
    node.name = "worker-1".to_string();
    node.attributes.insert("provider_id".to_string(), "aws:///i-123".to_string());

    let mut owner = QueryResult::new("own-1");
    owner.name = "web".to_string();
    owner.namespace = "default".to_string();
    owner.attributes.insert("kind".to_string(), "Deployment".to_string());
    owner.attributes.insert("controller".to_string(), "true".to_string());

    let mut pod = QueryResult::new("pod-1");
    pod.name = "web-abc".to_string();
    pod.namespace = "default".to_string();
    pod.attributes.insert("node_uid".to_string(), "node-1".to_string());
    pod.attributes.insert("owner_uid".to_string(), "own-1".to_string());

    let mut container = full_uptime("ctr-1");
    container.name = "app".to_string();
    container.attributes.insert("pod_uid".to_string(), "pod-1".to_string());

    let mut service = QueryResult::new("svc-1");
    service.name = "web".to_string();
    service.namespace = "default".to_string();
    service.attributes.insert("type".to_string(), "LoadBalancer".to_string());

    let mut port = QueryResult::new("svc-1");
    port.attributes.insert("port".to_string(), "443".to_string());
    port.attributes.insert("target_port".to_string(), "8443".to_string());

    let source = ScriptedSource::default()
        .with("cluster_uptime", Ok(vec![full_uptime("c1")]))
        .with("namespace_labels", Ok(vec![ns]))
        .with("namespace_uptime", Ok(vec![full_uptime("n1")]))
        .with("node_labels", Ok(vec![node]))
        .with("node_uptime", Ok(vec![full_uptime("node-1")]))
        .with(NodeMetric::CpuCoreUsageMax.name(), Ok(vec![value_result("node-1", 1.25)]))
        .with("owner_info", Ok(vec![owner]))
        .with("owner_uptime", Ok(vec![full_uptime("own-1")]))
        .with("pod_info", Ok(vec![pod]))
        .with("pod_uptime", Ok(vec![full_uptime("pod-1")]))
        .with(PodMetric::NetworkReceiveBytes.name(), Ok(vec![value_result("pod-1", 2048.4)]))
        .with("container_uptime", Ok(vec![container]))
        .with(cpu_usage_max.name(), Ok(vec![value_result("ctr-1", 0.25)]))
        .with("service_info", Ok(vec![service]))
        .with("service_ports", Ok(vec![port]))
        .with("service_uptime", Ok(vec![full_uptime("svc-1")]))
        .with(ServiceMetric::NetworkTransferBytes.name(), Ok(vec![value_result("svc-1", 10.0)]));

    let (start, end) = window();
    let set = model(source)
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();

    let node = &set.nodes["node-1"];
    assert_eq!(node.provider_resource_uid, "aws:///i-123");
    assert_eq!(node.cpu_millicore_usage_max, 1250);

    let owner = &set.owners["own-1"];
    assert_eq!(owner.kind, OwnerKind::Deployment);
    assert!(owner.controller);
    assert_eq!(owner.owner_uid, "n1");

    let pod = &set.pods["pod-1"];
    assert_eq!(pod.namespace_uid, "n1");
    assert_eq!(pod.node_uid, "node-1");
    assert_eq!(pod.owner_uid, "own-1");
    assert_eq!(pod.network_receive_bytes, 2048);
    assert_eq!(pod.end, Some(end));

    let container = &set.containers["ctr-1"];
    assert_eq!(container.pod_uid, "pod-1");
    assert_eq!(container.cpu_millicore_usage_max, 250);

    let service = &set.services["svc-1"];
    assert_eq!(service.service_type, ServiceType::LoadBalancer);
    assert_eq!(service.ports.len(), 1);
    assert_eq!(service.ports[0].port, 443);
    assert_eq!(service.ports[0].target_port, 8443);
    assert_eq!(service.network_transfer_bytes, 10);

    assert_eq!(set.metadata.object_count, 6);
    assert!(set.get_warnings().is_empty(), "{:?}", set.get_warnings());
}

#[tokio::test]
async fn test_cancellation_discards_set() {
    let source = ScriptedSource {
        hang: true,
        ..Default::default()
    };
    let km = model(source);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let (start, end) = window();
    let err = km.compute_kube_model_set(start, end, &cancel).await.unwrap_err();
    assert_eq!(err, ComputeError::Cancelled);
}

#[tokio::test]
async fn test_diagnostic_level_applies_to_set() {
    let km = model(ScriptedSource::default().with("cluster_uptime", Ok(vec![full_uptime("c1")])))
        .with_diagnostic_level(DiagnosticLevel::Error);

    let (start, end) = window();
    let set = km
        .compute_kube_model_set(start, end, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(set.metadata.diagnostic_level, DiagnosticLevel::Error);
}

#[test]
fn test_to_counter() {
    assert_eq!(to_counter(0.5, 1000.0), 500);
    assert_eq!(to_counter(2.6, 1.0), 3);
    assert_eq!(to_counter(-4.0, 1.0), 0);
    assert_eq!(to_counter(f64::NAN, 1.0), 0);
}
