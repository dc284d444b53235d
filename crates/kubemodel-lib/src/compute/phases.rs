//! Per-entity compute phases

use super::{to_counter, Run};
use crate::error::ComputeError;
use crate::model::{
    Bounded, Container, Labeled, Node, OwnerKind, Pod, Resource, Service, ServicePort,
    ServiceType,
};
use crate::source::{
    attributes, ContainerMeasure, ContainerMetric, NodeMetric, PodMetric, QueryResult,
    QuotaBound, QuotaSection, ServiceMetric,
};
use tracing::{debug, warn};

impl Run<'_> {
    pub(super) async fn compute_cluster(&mut self) -> Result<(), ComputeError> {
        let cluster_uid = self.cluster.uid.clone();
        if self.set.register_cluster(&cluster_uid).is_ok() {
            if let Some(cluster) = self.set.cluster.as_mut() {
                cluster.name = self.cluster.name.clone();
                cluster.provider = self.cluster.provider;
                cluster.account = self.cluster.account.clone();
            }
        }

        let group = self.group()?;
        let uptime = self.spawn(&group, "cluster_uptime", |s, start, end| async move {
            s.query_cluster_uptime(start, end).await
        });
        let results = self.collect(uptime).await?;

        if results.len() != 1 {
            self.set
                .error(format!("{} clusters returning from cluster uptime query", results.len()));
        }

        for result in results.iter().filter(|r| r.uid == cluster_uid) {
            match result.get_start_end(self.start, self.end, self.resolution) {
                Some((start, end)) => {
                    if let Some(cluster) = self.set.cluster.as_mut() {
                        cluster.set_bounds(start, end);
                    }
                }
                None => self.set.warn(format!("Cluster {cluster_uid} uptime has no data points")),
            }
        }

        Ok(())
    }

    pub(super) async fn compute_namespaces(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let uptime = self.spawn(&group, "namespace_uptime", |s, start, end| async move {
            s.query_namespace_uptime(start, end).await
        });
        let labels = self.spawn(&group, "namespace_labels", |s, start, end| async move {
            s.query_namespace_labels(start, end).await
        });
        let annotations = self.spawn(&group, "namespace_annotations", |s, start, end| async move {
            s.query_namespace_annotations(start, end).await
        });

        let uptime = self.collect(uptime).await?;
        let labels = self.collect(labels).await?;
        let annotations = self.collect(annotations).await?;

        for result in &labels {
            if self.set.register_namespace(&result.uid, namespace_name(result)).is_err() {
                continue;
            }
            if let Some(ns) = self.set.namespaces.get_mut(&result.uid) {
                ns.merge_labels(&result.labels);
            }
        }

        for result in &annotations {
            if self.set.register_namespace(&result.uid, namespace_name(result)).is_err() {
                continue;
            }
            if let Some(ns) = self.set.namespaces.get_mut(&result.uid) {
                ns.merge_annotations(&result.annotations);
            }
        }

        self.assign_bounds("Namespace", &uptime, |set| &mut set.namespaces);
        Ok(())
    }

    pub(super) async fn compute_resource_quotas(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let uptime = self.spawn(&group, "resource_quota_uptime", |s, start, end| async move {
            s.query_resource_quota_uptime(start, end).await
        });
        let stats: Vec<_> = crate::source::ResourceQuotaQuery::all()
            .into_iter()
            .map(|query| {
                let future = self.spawn(&group, query.name(), move |s, start, end| async move {
                    s.query_resource_quota(query, start, end).await
                });
                (query, future)
            })
            .collect();

        for (query, future) in stats {
            let results = self.collect(future).await?;
            for result in &results {
                let name = if result.resource_quota.is_empty() {
                    &result.name
                } else {
                    &result.resource_quota
                };
                if let Err(err) = self.set.register_resource_quota(&result.uid, name, &result.namespace) {
                    warn!(uid = %result.uid, error = %err, "Failed to register resource quota");
                    continue;
                }

                let Some(value) = result.value() else {
                    self.set.warn(format!(
                        "ResourceQuota {} {}: no data",
                        result.uid,
                        query.name()
                    ));
                    continue;
                };

                let Some(rq) = self.set.resource_quotas.get_mut(&result.uid) else {
                    continue;
                };
                let section = match query.section {
                    QuotaSection::SpecHard => &mut rq.spec.hard,
                    QuotaSection::StatusUsed => &mut rq.status.used,
                };
                let value = value * query.scale();
                match query.bound {
                    QuotaBound::Requests => {
                        section.set_request(query.resource, query.unit(), query.stat, value)
                    }
                    QuotaBound::Limits => {
                        section.set_limit(query.resource, query.unit(), query.stat, value)
                    }
                }
            }
        }

        let uptime = self.collect(uptime).await?;
        self.assign_bounds("ResourceQuota", &uptime, |set| &mut set.resource_quotas);
        Ok(())
    }

    pub(super) async fn compute_nodes(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let uptime = self.spawn(&group, "node_uptime", |s, start, end| async move {
            s.query_node_uptime(start, end).await
        });
        let labels = self.spawn(&group, "node_labels", |s, start, end| async move {
            s.query_node_labels(start, end).await
        });
        let annotations = self.spawn(&group, "node_annotations", |s, start, end| async move {
            s.query_node_annotations(start, end).await
        });
        let metrics: Vec<_> = NodeMetric::ALL
            .into_iter()
            .map(|metric| {
                let future = self.spawn(&group, metric.name(), move |s, start, end| async move {
                    s.query_node_metric(metric, start, end).await
                });
                (metric, future)
            })
            .collect();

        let uptime = self.collect(uptime).await?;
        let labels = self.collect(labels).await?;
        let annotations = self.collect(annotations).await?;

        for result in &labels {
            if self.set.register_node(&result.uid, &result.name).is_err() {
                continue;
            }
            if let Some(node) = self.set.nodes.get_mut(&result.uid) {
                node.merge_labels(&result.labels);
                if let Some(provider_id) = result.attribute(attributes::PROVIDER_ID) {
                    if node.provider_resource_uid.is_empty() {
                        node.provider_resource_uid = provider_id.to_string();
                    }
                }
            }
        }

        for result in &annotations {
            if self.set.register_node(&result.uid, &result.name).is_err() {
                continue;
            }
            if let Some(node) = self.set.nodes.get_mut(&result.uid) {
                node.merge_annotations(&result.annotations);
            }
        }

        self.assign_bounds("Node", &uptime, |set| &mut set.nodes);

        for (metric, future) in metrics {
            for result in self.collect(future).await? {
                let (Some(node), Some(value)) = (self.set.nodes.get_mut(&result.uid), result.value()) else {
                    debug!(metric = metric.name(), uid = %result.uid, "Skipping node metric");
                    continue;
                };
                *node_field(node, metric) = to_counter(value, metric.scale());
            }
        }

        Ok(())
    }

    pub(super) async fn compute_owners(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let info = self.spawn(&group, "owner_info", |s, start, end| async move {
            s.query_owner_info(start, end).await
        });
        let uptime = self.spawn(&group, "owner_uptime", |s, start, end| async move {
            s.query_owner_uptime(start, end).await
        });

        let info = self.collect(info).await?;
        let uptime = self.collect(uptime).await?;

        for result in &info {
            let raw_kind = result.attribute(attributes::KIND).unwrap_or_default();
            let Some(kind) = OwnerKind::parse_kind(raw_kind) else {
                self.set
                    .warn(format!("Owner {} has unsupported kind '{raw_kind}'", result.uid));
                continue;
            };
            let controller = result.attribute(attributes::CONTROLLER) == Some("true");

            if self
                .set
                .register_owner(&result.uid, &result.name, &result.namespace, kind, controller)
                .is_err()
            {
                continue;
            }
            if let Some(owner) = self.set.owners.get_mut(&result.uid) {
                owner.merge_labels(&result.labels);
                owner.merge_annotations(&result.annotations);
            }
        }

        self.assign_bounds("Owner", &uptime, |set| &mut set.owners);
        Ok(())
    }

    pub(super) async fn compute_pods(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let info = self.spawn(&group, "pod_info", |s, start, end| async move {
            s.query_pod_info(start, end).await
        });
        let uptime = self.spawn(&group, "pod_uptime", |s, start, end| async move {
            s.query_pod_uptime(start, end).await
        });
        let labels = self.spawn(&group, "pod_labels", |s, start, end| async move {
            s.query_pod_labels(start, end).await
        });
        let annotations = self.spawn(&group, "pod_annotations", |s, start, end| async move {
            s.query_pod_annotations(start, end).await
        });
        let metrics: Vec<_> = PodMetric::ALL
            .into_iter()
            .map(|metric| {
                let future = self.spawn(&group, metric.name(), move |s, start, end| async move {
                    s.query_pod_metric(metric, start, end).await
                });
                (metric, future)
            })
            .collect();

        let info = self.collect(info).await?;
        let uptime = self.collect(uptime).await?;
        let labels = self.collect(labels).await?;
        let annotations = self.collect(annotations).await?;

        for result in &info {
            if self
                .set
                .register_pod(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            if let Some(node_uid) = result.attribute(attributes::NODE_UID) {
                if let Err(err) = self.set.link_pod_node(&result.uid, node_uid) {
                    debug!(uid = %result.uid, node_uid = %node_uid, error = %err, "Failed to link pod to node");
                }
            }
            if let Some(owner_uid) = result.attribute(attributes::OWNER_UID) {
                if let Err(err) = self.set.link_pod_owner(&result.uid, owner_uid) {
                    debug!(uid = %result.uid, owner_uid = %owner_uid, error = %err, "Failed to link pod to owner");
                }
            }
        }

        for result in &labels {
            if self
                .set
                .register_pod(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            if let Some(pod) = self.set.pods.get_mut(&result.uid) {
                pod.merge_labels(&result.labels);
            }
        }

        for result in &annotations {
            if self
                .set
                .register_pod(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            if let Some(pod) = self.set.pods.get_mut(&result.uid) {
                pod.merge_annotations(&result.annotations);
            }
        }

        self.assign_bounds("Pod", &uptime, |set| &mut set.pods);

        for (metric, future) in metrics {
            for result in self.collect(future).await? {
                let (Some(pod), Some(value)) = (self.set.pods.get_mut(&result.uid), result.value()) else {
                    debug!(metric = metric.name(), uid = %result.uid, "Skipping pod metric");
                    continue;
                };
                *pod_field(pod, metric) = to_counter(value, metric.scale());
            }
        }

        Ok(())
    }

    pub(super) async fn compute_containers(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let uptime = self.spawn(&group, "container_uptime", |s, start, end| async move {
            s.query_container_uptime(start, end).await
        });
        let metrics: Vec<_> = ContainerMetric::all()
            .into_iter()
            .map(|metric| {
                let future = self.spawn(&group, metric.name(), move |s, start, end| async move {
                    s.query_container_metric(metric, start, end).await
                });
                (metric, future)
            })
            .collect();

        let uptime = self.collect(uptime).await?;

        for result in &uptime {
            let pod_uid = result.attribute(attributes::POD_UID).unwrap_or_default();
            if let Err(err) = self.set.register_container(&result.uid, &result.name, pod_uid) {
                debug!(uid = %result.uid, pod_uid = %pod_uid, error = %err, "Failed to register container");
            }
        }

        self.assign_bounds("Container", &uptime, |set| &mut set.containers);

        for (metric, future) in metrics {
            for result in self.collect(future).await? {
                let (Some(container), Some(value)) =
                    (self.set.containers.get_mut(&result.uid), result.value())
                else {
                    debug!(metric = %metric.name(), uid = %result.uid, "Skipping container metric");
                    continue;
                };
                match container_field(container, metric) {
                    Some(field) => *field = to_counter(value, metric.scale()),
                    None => debug!(metric = %metric.name(), "Container has no counter for metric"),
                }
            }
        }

        Ok(())
    }

    pub(super) async fn compute_services(&mut self) -> Result<(), ComputeError> {
        let group = self.group()?;
        let info = self.spawn(&group, "service_info", |s, start, end| async move {
            s.query_service_info(start, end).await
        });
        let ports = self.spawn(&group, "service_ports", |s, start, end| async move {
            s.query_service_ports(start, end).await
        });
        let uptime = self.spawn(&group, "service_uptime", |s, start, end| async move {
            s.query_service_uptime(start, end).await
        });
        let labels = self.spawn(&group, "service_labels", |s, start, end| async move {
            s.query_service_labels(start, end).await
        });
        let annotations = self.spawn(&group, "service_annotations", |s, start, end| async move {
            s.query_service_annotations(start, end).await
        });
        let metrics: Vec<_> = ServiceMetric::ALL
            .into_iter()
            .map(|metric| {
                let future = self.spawn(&group, metric.name(), move |s, start, end| async move {
                    s.query_service_metric(metric, start, end).await
                });
                (metric, future)
            })
            .collect();

        let info = self.collect(info).await?;
        let ports = self.collect(ports).await?;
        let uptime = self.collect(uptime).await?;
        let labels = self.collect(labels).await?;
        let annotations = self.collect(annotations).await?;

        for result in &info {
            if self
                .set
                .register_service(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            let service_type = match result.attribute(attributes::SERVICE_TYPE) {
                Some(raw) => match raw.parse::<ServiceType>() {
                    Ok(service_type) => Some(service_type),
                    Err(err) => {
                        self.set.warn(format!("Service {}: {err}", result.uid));
                        None
                    }
                },
                None => None,
            };
            if let Some(service) = self.set.services.get_mut(&result.uid) {
                if let Some(service_type) = service_type {
                    service.service_type = service_type;
                }
                if let Some(hostname) = result.attribute(attributes::HOSTNAME) {
                    service.hostname = hostname.to_string();
                }
            }
        }

        for result in &ports {
            let Some(service) = self.set.services.get_mut(&result.uid) else {
                debug!(uid = %result.uid, "Port for unregistered service");
                continue;
            };
            let port = service_port(result);
            if !service.ports.contains(&port) {
                service.ports.push(port);
            }
        }

        for result in &labels {
            if self
                .set
                .register_service(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            if let Some(service) = self.set.services.get_mut(&result.uid) {
                service.merge_labels(&result.labels);
            }
        }

        for result in &annotations {
            if self
                .set
                .register_service(&result.uid, &result.name, &result.namespace)
                .is_err()
            {
                continue;
            }
            if let Some(service) = self.set.services.get_mut(&result.uid) {
                service.merge_annotations(&result.annotations);
            }
        }

        self.assign_bounds("Service", &uptime, |set| &mut set.services);

        for (metric, future) in metrics {
            for result in self.collect(future).await? {
                let (Some(service), Some(value)) =
                    (self.set.services.get_mut(&result.uid), result.value())
                else {
                    debug!(metric = metric.name(), uid = %result.uid, "Skipping service metric");
                    continue;
                };
                *service_field(service, metric) = to_counter(value, 1.0);
            }
        }

        Ok(())
    }
}

/// Namespace results carry the name either as `namespace` or `name`.
fn namespace_name(result: &QueryResult) -> &str {
    if result.namespace.is_empty() {
        &result.name
    } else {
        &result.namespace
    }
}

fn service_port(result: &QueryResult) -> ServicePort {
    let number = |key: &str| {
        result
            .attribute(key)
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or_default()
    };
    ServicePort {
        name: result.attribute(attributes::PORT_NAME).unwrap_or_default().to_string(),
        port: number(attributes::PORT),
        target_port: number(attributes::TARGET_PORT),
        node_port: number(attributes::NODE_PORT),
        protocol: result.attribute(attributes::PROTOCOL).unwrap_or("TCP").to_string(),
    }
}

fn node_field(node: &mut Node, metric: NodeMetric) -> &mut u64 {
    match metric {
        NodeMetric::CpuCoreSecondsAllocated => &mut node.cpu_millicore_seconds_allocated,
        NodeMetric::RamByteSecondsAllocated => &mut node.ram_byte_seconds_allocated,
        NodeMetric::PublicIpSecondsAllocated => &mut node.public_ip_seconds_allocated,
        NodeMetric::CpuCoreUsageAverage => &mut node.cpu_millicore_usage_average,
        NodeMetric::CpuCoreUsageMax => &mut node.cpu_millicore_usage_max,
        NodeMetric::RamByteUsageAverage => &mut node.ram_byte_usage_average,
        NodeMetric::RamByteUsageMax => &mut node.ram_byte_usage_max,
    }
}

fn pod_field(pod: &mut Pod, metric: PodMetric) -> &mut u64 {
    match metric {
        PodMetric::CpuCoreUsageMax => &mut pod.cpu_millicore_usage_max,
        PodMetric::RamByteUsageMax => &mut pod.ram_byte_usage_max,
        PodMetric::NetworkTransferBytes => &mut pod.network_transfer_bytes,
        PodMetric::NetworkReceiveBytes => &mut pod.network_receive_bytes,
    }
}

/// Counter backing a container metric; containers carry no GPU counters.
fn container_field(container: &mut Container, metric: ContainerMetric) -> Option<&mut u64> {
    use ContainerMeasure::*;
    let field = match (metric.resource, metric.measure) {
        (Resource::Cpu, SecondsAllocated) => &mut container.cpu_millicore_seconds_allocated,
        (Resource::Cpu, RequestAverage) => &mut container.cpu_millicore_request_average_allocated,
        (Resource::Cpu, UsageAverage) => &mut container.cpu_millicore_usage_average,
        (Resource::Cpu, UsageMax) => &mut container.cpu_millicore_usage_max,
        (Resource::Memory, SecondsAllocated) => &mut container.ram_byte_seconds_allocated,
        (Resource::Memory, RequestAverage) => &mut container.ram_byte_request_average_allocated,
        (Resource::Memory, UsageAverage) => &mut container.ram_byte_usage_average,
        (Resource::Memory, UsageMax) => &mut container.ram_byte_usage_max,
        (Resource::Storage, SecondsAllocated) => &mut container.storage_byte_seconds_allocated,
        (Resource::Storage, RequestAverage) => &mut container.storage_byte_request_average_allocated,
        (Resource::Storage, UsageAverage) => &mut container.storage_byte_usage_average,
        (Resource::Storage, UsageMax) => &mut container.storage_byte_usage_max,
        (Resource::Gpu, _) => return None,
    };
    Some(field)
}

fn service_field(service: &mut Service, metric: ServiceMetric) -> &mut u64 {
    match metric {
        ServiceMetric::NetworkTransferBytes => &mut service.network_transfer_bytes,
        ServiceMetric::NetworkReceiveBytes => &mut service.network_receive_bytes,
    }
}
