//! [`MetricsSource`] backed by kube-state-metrics and cAdvisor series
//!
//! Uptime queries are range queries sampled at the source resolution so that
//! lifetimes can be derived from the first and last sample. Everything else
//! is an instant query evaluated at the window end over the whole window.

use super::client::{PrometheusClient, SeriesKeys};
use super::config::PrometheusConfig;
use crate::error::SourceResult;
use crate::model::{Resource, StatType};
use crate::source::{
    ContainerMeasure, ContainerMetric, MetricsSource, NodeMetric, PodMetric, QueryResponse,
    QuotaBound, QuotaSection, ResourceQuotaQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

const CLUSTER_KEYS: SeriesKeys = SeriesKeys::new("uid", "namespace");
const NAMESPACE_KEYS: SeriesKeys = SeriesKeys::new("uid", "namespace");
const QUOTA_KEYS: SeriesKeys = SeriesKeys::new("uid", "resourcequota");
const NODE_KEYS: SeriesKeys = SeriesKeys::new("system_uuid", "node");
const POD_KEYS: SeriesKeys = SeriesKeys::new("uid", "pod");
const CONTAINER_KEYS: SeriesKeys = SeriesKeys::new("container_id", "container");
const SERVICE_KEYS: SeriesKeys = SeriesKeys::new("uid", "service");

/// Namespace whose UID identifies the cluster.
pub const CLUSTER_NAMESPACE: &str = "kube-system";

/// Queries a Prometheus-compatible backend.
#[derive(Debug, Clone)]
pub struct PrometheusSource {
    client: PrometheusClient,
    resolution: Duration,
    cluster_matcher: Option<String>,
}

impl PrometheusSource {
    pub fn new(config: &PrometheusConfig) -> SourceResult<Self> {
        let client = PrometheusClient::new(config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: PrometheusClient, config: &PrometheusConfig) -> Self {
        Self {
            client,
            resolution: config.data_resolution(),
            cluster_matcher: config.cluster_matcher(),
        }
    }

    /// Label selector with the cluster matcher appended.
    pub fn selector(&self, matchers: &[&str]) -> String {
        let mut all: Vec<&str> = matchers.to_vec();
        if let Some(cluster) = &self.cluster_matcher {
            all.push(cluster);
        }
        if all.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", all.join(", "))
        }
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!("{}s", (end - start).num_seconds().max(1))
    }

    fn step(&self) -> String {
        format!("{}s", self.resolution.as_secs().max(1))
    }

    async fn range(&self, promql: String, start: DateTime<Utc>, end: DateTime<Utc>, keys: SeriesKeys) -> QueryResponse {
        let step = chrono::Duration::from_std(self.resolution).unwrap_or_else(|_| chrono::Duration::minutes(1));
        // Samples are aligned to the start of each resolution step
        let last = (end - step).max(start);
        debug!(query = %promql, "Prometheus range query");
        self.client.query_range(&promql, start, last, self.resolution, keys).await
    }

    async fn instant(&self, promql: String, end: DateTime<Utc>, keys: SeriesKeys) -> QueryResponse {
        debug!(query = %promql, "Prometheus instant query");
        self.client.query(&promql, end, keys).await
    }

    fn namespace_uids(&self, window: &str) -> String {
        format!(
            "group(max_over_time(kube_namespace_created{}[{window}])) by (namespace, uid)",
            self.selector(&[])
        )
    }

    fn node_uids(&self, window: &str) -> String {
        format!(
            "group(max_over_time(kube_node_info{}[{window}])) by (node, system_uuid, provider_id)",
            self.selector(&[])
        )
    }

    fn pod_uids(&self, window: &str) -> String {
        format!(
            "group(max_over_time(kube_pod_info{}[{window}])) by (namespace, pod, uid)",
            self.selector(&[])
        )
    }

    fn container_ids(&self, window: &str) -> String {
        format!(
            "group(max_over_time(kube_pod_container_info{}[{window}])) by (namespace, pod, container, container_id)",
            self.selector(&[])
        )
    }

    pub fn resource_quota_promql(&self, query: &ResourceQuotaQuery, window: &str) -> String {
        let kind = match query.section {
            QuotaSection::SpecHard => "hard",
            QuotaSection::StatusUsed => "used",
        };
        let bound = match query.bound {
            QuotaBound::Requests => "requests",
            QuotaBound::Limits => "limits",
        };
        let func = match query.stat {
            StatType::Max => "max_over_time",
            _ => "avg_over_time",
        };
        let type_matcher = format!("type=\"{kind}\"");
        let resource_matcher = format!("resource=\"{bound}.{}\"", query.resource);
        format!(
            "sum({func}(kube_resourcequota{}[{window}])) by (namespace, resourcequota) \
             * on (namespace, resourcequota) group_left(uid) \
             group(max_over_time(kube_resourcequota_created{}[{window}])) by (namespace, resourcequota, uid)",
            self.selector(&[&resource_matcher, &type_matcher]),
            self.selector(&[]),
        )
    }

    pub fn node_promql(&self, metric: NodeMetric, window: &str, seconds: i64) -> String {
        let containers = self.selector(&["container!=\"\""]);
        let step = self.step();
        let expr = match metric {
            NodeMetric::CpuCoreSecondsAllocated => format!(
                "sum(avg_over_time(kube_node_status_capacity{}[{window}])) by (node) * {seconds}",
                self.selector(&["resource=\"cpu\""])
            ),
            NodeMetric::RamByteSecondsAllocated => format!(
                "sum(avg_over_time(kube_node_status_capacity{}[{window}])) by (node) * {seconds}",
                self.selector(&["resource=\"memory\""])
            ),
            NodeMetric::PublicIpSecondsAllocated => format!(
                "(count(max_over_time(kube_node_status_addresses{}[{window}])) by (node) > bool 0) * {seconds}",
                self.selector(&["type=\"ExternalIP\""])
            ),
            NodeMetric::CpuCoreUsageAverage => format!(
                "sum(rate(container_cpu_usage_seconds_total{containers}[{window}])) by (node)"
            ),
            NodeMetric::CpuCoreUsageMax => format!(
                "max_over_time(sum(rate(container_cpu_usage_seconds_total{containers}[{step}])) by (node)[{window}:{step}])"
            ),
            NodeMetric::RamByteUsageAverage => format!(
                "avg_over_time(sum(container_memory_working_set_bytes{containers}) by (node)[{window}:{step}])"
            ),
            NodeMetric::RamByteUsageMax => format!(
                "max_over_time(sum(container_memory_working_set_bytes{containers}) by (node)[{window}:{step}])"
            ),
        };
        format!(
            "{expr} * on (node) group_left(system_uuid) {}",
            self.node_uids(window)
        )
    }

    pub fn pod_promql(&self, metric: PodMetric, window: &str) -> String {
        let containers = self.selector(&["container!=\"\""]);
        let sel = self.selector(&[]);
        let step = self.step();
        let expr = match metric {
            PodMetric::CpuCoreUsageMax => format!(
                "max_over_time(sum(rate(container_cpu_usage_seconds_total{containers}[{step}])) by (namespace, pod)[{window}:{step}])"
            ),
            PodMetric::RamByteUsageMax => format!(
                "max_over_time(sum(container_memory_working_set_bytes{containers}) by (namespace, pod)[{window}:{step}])"
            ),
            PodMetric::NetworkTransferBytes => format!(
                "sum(increase(container_network_transmit_bytes_total{sel}[{window}])) by (namespace, pod)"
            ),
            PodMetric::NetworkReceiveBytes => format!(
                "sum(increase(container_network_receive_bytes_total{sel}[{window}])) by (namespace, pod)"
            ),
        };
        format!(
            "{expr} * on (namespace, pod) group_left(uid) {}",
            self.pod_uids(window)
        )
    }

    pub fn container_promql(&self, metric: ContainerMetric, window: &str, seconds: i64) -> String {
        let containers = self.selector(&["container!=\"\""]);
        let step = self.step();
        let request_resource = match metric.resource {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
            _ => "ephemeral_storage",
        };
        let requests = self.selector(&[&format!("resource=\"{request_resource}\"")]);
        let usage_series = match metric.resource {
            Resource::Cpu => format!("rate(container_cpu_usage_seconds_total{containers}[{step}])"),
            Resource::Memory => format!("container_memory_working_set_bytes{containers}"),
            _ => format!("container_fs_usage_bytes{containers}"),
        };

        let expr = match metric.measure {
            ContainerMeasure::SecondsAllocated => format!(
                "sum(avg_over_time(kube_pod_container_resource_requests{requests}[{window}])) by (namespace, pod, container) * {seconds}"
            ),
            ContainerMeasure::RequestAverage => format!(
                "sum(avg_over_time(kube_pod_container_resource_requests{requests}[{window}])) by (namespace, pod, container)"
            ),
            ContainerMeasure::UsageAverage => format!(
                "avg_over_time(sum({usage_series}) by (namespace, pod, container)[{window}:{step}])"
            ),
            ContainerMeasure::UsageMax => format!(
                "max_over_time(sum({usage_series}) by (namespace, pod, container)[{window}:{step}])"
            ),
        };
        format!(
            "{expr} * on (namespace, pod, container) group_left(container_id) {}",
            self.container_ids(window)
        )
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    fn resolution(&self) -> Duration {
        self.resolution
    }

    async fn query_cluster_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let matcher = format!("namespace=\"{CLUSTER_NAMESPACE}\"");
        let promql = format!(
            "group(kube_namespace_created{}) by (namespace, uid)",
            self.selector(&[&matcher])
        );
        self.range(promql, start, end, CLUSTER_KEYS).await
    }

    async fn query_namespace_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "group(kube_namespace_created{}) by (namespace, uid)",
            self.selector(&[])
        );
        self.range(promql, start, end, NAMESPACE_KEYS).await
    }

    async fn query_namespace_labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!(
            "max_over_time(kube_namespace_labels{}[{window}]) * on (namespace) group_left(uid) {}",
            self.selector(&[]),
            self.namespace_uids(&window)
        );
        self.instant(promql, end, NAMESPACE_KEYS).await
    }

    async fn query_namespace_annotations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!(
            "max_over_time(kube_namespace_annotations{}[{window}]) * on (namespace) group_left(uid) {}",
            self.selector(&[]),
            self.namespace_uids(&window)
        );
        self.instant(promql, end, NAMESPACE_KEYS).await
    }

    async fn query_resource_quota_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "group(kube_resourcequota_created{}) by (namespace, resourcequota, uid)",
            self.selector(&[])
        );
        self.range(promql, start, end, QUOTA_KEYS).await
    }

    async fn query_resource_quota(
        &self,
        query: ResourceQuotaQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = self.resource_quota_promql(&query, &window);
        self.instant(promql, end, QUOTA_KEYS).await
    }

    async fn query_node_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "group(kube_node_info{}) by (node, system_uuid)",
            self.selector(&[])
        );
        self.range(promql, start, end, NODE_KEYS).await
    }

    async fn query_node_labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!(
            "max_over_time(kube_node_labels{}[{window}]) * on (node) group_left(system_uuid, provider_id) {}",
            self.selector(&[]),
            self.node_uids(&window)
        );
        self.instant(promql, end, NODE_KEYS).await
    }

    async fn query_node_annotations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!(
            "max_over_time(kube_node_annotations{}[{window}]) * on (node) group_left(system_uuid) {}",
            self.selector(&[]),
            self.node_uids(&window)
        );
        self.instant(promql, end, NODE_KEYS).await
    }

    async fn query_node_metric(&self, metric: NodeMetric, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = self.node_promql(metric, &window, (end - start).num_seconds());
        self.instant(promql, end, NODE_KEYS).await
    }

    async fn query_pod_info(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!(
            "max_over_time(kube_pod_info{}[{window}]) * on (node) group_left(node_uid) \
             label_replace({}, \"node_uid\", \"$1\", \"system_uuid\", \"(.+)\")",
            self.selector(&[]),
            self.node_uids(&window)
        );
        self.instant(promql, end, POD_KEYS).await
    }

    async fn query_pod_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "group(kube_pod_info{}) by (namespace, pod, uid)",
            self.selector(&[])
        );
        self.range(promql, start, end, POD_KEYS).await
    }

    async fn query_pod_labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!("max_over_time(kube_pod_labels{}[{window}])", self.selector(&[]));
        self.instant(promql, end, POD_KEYS).await
    }

    async fn query_pod_annotations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = format!("max_over_time(kube_pod_annotations{}[{window}])", self.selector(&[]));
        self.instant(promql, end, POD_KEYS).await
    }

    async fn query_pod_metric(&self, metric: PodMetric, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = self.pod_promql(metric, &window);
        self.instant(promql, end, POD_KEYS).await
    }

    async fn query_container_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "label_replace(group(kube_pod_container_info{}) by (namespace, pod, uid, container, container_id), \
             \"pod_uid\", \"$1\", \"uid\", \"(.+)\")",
            self.selector(&[])
        );
        self.range(promql, start, end, CONTAINER_KEYS).await
    }

    async fn query_container_metric(
        &self,
        metric: ContainerMetric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> QueryResponse {
        let window = Self::window(start, end);
        let promql = self.container_promql(metric, &window, (end - start).num_seconds());
        self.instant(promql, end, CONTAINER_KEYS).await
    }

    async fn query_service_info(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let sel = self.selector(&[]);
        let promql = format!(
            "max_over_time(kube_service_info{sel}[{window}]) * on (namespace, service) group_left(type) \
             group(max_over_time(kube_service_spec_type{sel}[{window}])) by (namespace, service, type)"
        );
        self.instant(promql, end, SERVICE_KEYS).await
    }

    async fn query_service_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let promql = format!(
            "group(kube_service_info{}) by (namespace, service, uid)",
            self.selector(&[])
        );
        self.range(promql, start, end, SERVICE_KEYS).await
    }

    async fn query_service_labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let sel = self.selector(&[]);
        let promql = format!(
            "max_over_time(kube_service_labels{sel}[{window}]) * on (namespace, service) group_left(uid) \
             group(max_over_time(kube_service_info{sel}[{window}])) by (namespace, service, uid)"
        );
        self.instant(promql, end, SERVICE_KEYS).await
    }

    async fn query_service_annotations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse {
        let window = Self::window(start, end);
        let sel = self.selector(&[]);
        let promql = format!(
            "max_over_time(kube_service_annotations{sel}[{window}]) * on (namespace, service) group_left(uid) \
             group(max_over_time(kube_service_info{sel}[{window}])) by (namespace, service, uid)"
        );
        self.instant(promql, end, SERVICE_KEYS).await
    }
}
