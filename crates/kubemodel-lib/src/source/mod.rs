//! Metrics source abstraction
//!
//! A [`MetricsSource`] answers one typed query per metric shape. Results are
//! series keyed by the UID of the entity they describe; uptime queries carry
//! enough samples to derive entity lifetimes, metric queries carry a leading
//! value.
//!
//! Cluster, namespace and resource-quota queries are required. The
//! workload inventory queries default to empty results so that sources
//! without that data remain usable.

mod group;
pub mod prom;
mod query;
mod result;


pub use group::{QueryFuture, QueryGroup};
pub use query::{
    ContainerMeasure, ContainerMetric, NodeMetric, PodMetric, QuotaBound, QuotaSection,
    ResourceQuotaQuery, ServiceMetric, CORES_TO_MILLICORES,
};
pub use result::{DataPoint, QueryResult};

use crate::error::SourceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of a single query: one entry per series.
pub type QueryResponse = SourceResult<Vec<QueryResult>>;

/// Attribute keys used by inventory queries.
pub mod attributes {
    /// UID of the pod a container belongs to.
    pub const POD_UID: &str = "pod_uid";
    /// UID of the node a pod runs on.
    pub const NODE_UID: &str = "node_uid";
    /// UID of the controller owning a pod.
    pub const OWNER_UID: &str = "owner_uid";
    /// Kubernetes kind of an owner.
    pub const KIND: &str = "kind";
    /// `"true"` when the owner is the managing controller.
    pub const CONTROLLER: &str = "controller";
    /// Cloud provider instance identifier of a node.
    pub const PROVIDER_ID: &str = "provider_id";
    /// Service type.
    pub const SERVICE_TYPE: &str = "type";
    /// Load balancer hostname of a service.
    pub const HOSTNAME: &str = "hostname";
    pub const PORT_NAME: &str = "port_name";
    pub const PORT: &str = "port";
    pub const TARGET_PORT: &str = "target_port";
    pub const NODE_PORT: &str = "node_port";
    pub const PROTOCOL: &str = "protocol";
}

/// Typed queries against a metrics backend.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Minimum sampling granularity of the backend.
    fn resolution(&self) -> Duration;

    async fn query_cluster_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse;

    async fn query_namespace_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse;

    async fn query_namespace_labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse;

    async fn query_namespace_annotations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse;

    async fn query_resource_quota_uptime(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResponse;

    /// One of the sixteen quota statistics; values in cores or bytes.
    async fn query_resource_quota(
        &self,
        query: ResourceQuotaQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> QueryResponse;

    async fn query_node_uptime(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    /// Node labels; the provider instance id travels as an attribute.
    async fn query_node_labels(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_node_annotations(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_node_metric(
        &self,
        _metric: NodeMetric,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> QueryResponse {
        Ok(Vec::new())
    }

    /// Owners with `kind` and `controller` attributes.
    async fn query_owner_info(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_owner_uptime(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    /// Pods with `node_uid` and `owner_uid` attributes.
    async fn query_pod_info(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_pod_uptime(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_pod_labels(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_pod_annotations(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_pod_metric(
        &self,
        _metric: PodMetric,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> QueryResponse {
        Ok(Vec::new())
    }

    /// Container uptime; `name` is the container name and the pod travels
    /// as the `pod_uid` attribute.
    async fn query_container_uptime(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_container_metric(
        &self,
        _metric: ContainerMetric,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> QueryResponse {
        Ok(Vec::new())
    }

    /// Services with `type` and `hostname` attributes.
    async fn query_service_info(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    /// One result per service port, keyed by the service UID.
    async fn query_service_ports(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_service_uptime(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_service_labels(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_service_annotations(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> QueryResponse {
        Ok(Vec::new())
    }

    async fn query_service_metric(
        &self,
        _metric: ServiceMetric,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> QueryResponse {
        Ok(Vec::new())
    }
}
