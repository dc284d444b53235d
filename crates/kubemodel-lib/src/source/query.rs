//! Typed keys for parameterized metric queries

use crate::model::{Resource, StatType, Unit};
use serde::{Deserialize, Serialize};

/// Quota section a statistic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaSection {
    /// `spec.hard`: declared limits.
    SpecHard,
    /// `status.used`: observed consumption.
    StatusUsed,
}

/// Requests or limits half of a quota section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaBound {
    Requests,
    Limits,
}

/// One of the sixteen resource-quota statistic queries:
/// {spec.hard, status.used} × {requests, limits} × {cpu, memory} × {avg, max}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceQuotaQuery {
    pub section: QuotaSection,
    pub bound: QuotaBound,
    pub resource: Resource,
    pub stat: StatType,
}

impl ResourceQuotaQuery {
    /// Every combination, in a stable order.
    pub fn all() -> Vec<ResourceQuotaQuery> {
        let mut queries = Vec::with_capacity(16);
        for section in [QuotaSection::SpecHard, QuotaSection::StatusUsed] {
            for bound in [QuotaBound::Requests, QuotaBound::Limits] {
                for resource in [Resource::Cpu, Resource::Memory] {
                    for stat in [StatType::Avg, StatType::Max] {
                        queries.push(ResourceQuotaQuery {
                            section,
                            bound,
                            resource,
                            stat,
                        });
                    }
                }
            }
        }
        queries
    }

    /// Unit the statistic is stored in.
    pub fn unit(&self) -> Unit {
        match self.resource {
            Resource::Cpu => Unit::Millicore,
            _ => Unit::Byte,
        }
    }

    /// Factor applied to source values: CPU arrives in cores.
    pub fn scale(&self) -> f64 {
        match self.resource {
            Resource::Cpu => CORES_TO_MILLICORES,
            _ => 1.0,
        }
    }

    /// Stable identifier, e.g. `spec_hard_requests_cpu_avg`.
    pub fn name(&self) -> String {
        let section = match self.section {
            QuotaSection::SpecHard => "spec_hard",
            QuotaSection::StatusUsed => "status_used",
        };
        let bound = match self.bound {
            QuotaBound::Requests => "requests",
            QuotaBound::Limits => "limits",
        };
        format!("{section}_{bound}_{}_{}", self.resource, self.stat)
    }
}

/// Cores to millicores.
pub const CORES_TO_MILLICORES: f64 = 1000.0;

/// Node counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeMetric {
    CpuCoreSecondsAllocated,
    RamByteSecondsAllocated,
    PublicIpSecondsAllocated,
    CpuCoreUsageAverage,
    CpuCoreUsageMax,
    RamByteUsageAverage,
    RamByteUsageMax,
}

impl NodeMetric {
    pub const ALL: [NodeMetric; 7] = [
        NodeMetric::CpuCoreSecondsAllocated,
        NodeMetric::RamByteSecondsAllocated,
        NodeMetric::PublicIpSecondsAllocated,
        NodeMetric::CpuCoreUsageAverage,
        NodeMetric::CpuCoreUsageMax,
        NodeMetric::RamByteUsageAverage,
        NodeMetric::RamByteUsageMax,
    ];

    pub fn scale(&self) -> f64 {
        match self {
            NodeMetric::CpuCoreSecondsAllocated
            | NodeMetric::CpuCoreUsageAverage
            | NodeMetric::CpuCoreUsageMax => CORES_TO_MILLICORES,
            _ => 1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeMetric::CpuCoreSecondsAllocated => "node_cpu_core_seconds_allocated",
            NodeMetric::RamByteSecondsAllocated => "node_ram_byte_seconds_allocated",
            NodeMetric::PublicIpSecondsAllocated => "node_public_ip_seconds_allocated",
            NodeMetric::CpuCoreUsageAverage => "node_cpu_core_usage_average",
            NodeMetric::CpuCoreUsageMax => "node_cpu_core_usage_max",
            NodeMetric::RamByteUsageAverage => "node_ram_byte_usage_average",
            NodeMetric::RamByteUsageMax => "node_ram_byte_usage_max",
        }
    }
}

/// Pod counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodMetric {
    CpuCoreUsageMax,
    RamByteUsageMax,
    NetworkTransferBytes,
    NetworkReceiveBytes,
}

impl PodMetric {
    pub const ALL: [PodMetric; 4] = [
        PodMetric::CpuCoreUsageMax,
        PodMetric::RamByteUsageMax,
        PodMetric::NetworkTransferBytes,
        PodMetric::NetworkReceiveBytes,
    ];

    pub fn scale(&self) -> f64 {
        match self {
            PodMetric::CpuCoreUsageMax => CORES_TO_MILLICORES,
            _ => 1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PodMetric::CpuCoreUsageMax => "pod_cpu_core_usage_max",
            PodMetric::RamByteUsageMax => "pod_ram_byte_usage_max",
            PodMetric::NetworkTransferBytes => "pod_network_transfer_bytes",
            PodMetric::NetworkReceiveBytes => "pod_network_receive_bytes",
        }
    }
}

/// What a container counter measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerMeasure {
    SecondsAllocated,
    RequestAverage,
    UsageAverage,
    UsageMax,
}

/// Container counter: a measure of CPU, memory or storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub resource: Resource,
    pub measure: ContainerMeasure,
}

impl ContainerMetric {
    /// All twelve container counters.
    pub fn all() -> Vec<ContainerMetric> {
        let measures = [
            ContainerMeasure::SecondsAllocated,
            ContainerMeasure::RequestAverage,
            ContainerMeasure::UsageAverage,
            ContainerMeasure::UsageMax,
        ];
        [Resource::Cpu, Resource::Memory, Resource::Storage]
            .into_iter()
            .flat_map(|resource| {
                measures
                    .into_iter()
                    .map(move |measure| ContainerMetric { resource, measure })
            })
            .collect()
    }

    pub fn scale(&self) -> f64 {
        match self.resource {
            Resource::Cpu => CORES_TO_MILLICORES,
            _ => 1.0,
        }
    }

    pub fn name(&self) -> String {
        let measure = match self.measure {
            ContainerMeasure::SecondsAllocated => "seconds_allocated",
            ContainerMeasure::RequestAverage => "request_average",
            ContainerMeasure::UsageAverage => "usage_average",
            ContainerMeasure::UsageMax => "usage_max",
        };
        format!("container_{}_{measure}", self.resource)
    }
}

/// Service counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceMetric {
    NetworkTransferBytes,
    NetworkReceiveBytes,
}

impl ServiceMetric {
    pub const ALL: [ServiceMetric; 2] = [
        ServiceMetric::NetworkTransferBytes,
        ServiceMetric::NetworkReceiveBytes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceMetric::NetworkTransferBytes => "service_network_transfer_bytes",
            ServiceMetric::NetworkReceiveBytes => "service_network_receive_bytes",
        }
    }
}
