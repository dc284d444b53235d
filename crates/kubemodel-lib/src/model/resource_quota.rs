use super::{Resource, ResourceQuantities, StatType, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requests and limits for a set of resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestsLimits {
    pub requests: ResourceQuantities,
    pub limits: ResourceQuantities,
}

impl RequestsLimits {
    pub fn set_request(&mut self, resource: Resource, unit: Unit, stat: StatType, value: f64) {
        self.requests.set(resource, unit, stat, value);
    }

    pub fn set_limit(&mut self, resource: Resource, unit: Unit, stat: StatType, value: f64) {
        self.limits.set(resource, unit, stat, value);
    }
}

/// Hard limits declared by the quota.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuotaSpec {
    pub hard: RequestsLimits,
}

/// Observed consumption against the quota.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuotaStatus {
    pub used: RequestsLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuota {
    pub uid: String,
    pub namespace_uid: String,
    pub name: String,
    pub spec: ResourceQuotaSpec,
    pub status: ResourceQuotaStatus,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ResourceQuota {
    /// All statistic sets of the quota with a label naming their section.
    pub fn quantities(&self) -> [(&'static str, &ResourceQuantities); 4] {
        [
            ("spec.hard.requests", &self.spec.hard.requests),
            ("spec.hard.limits", &self.spec.hard.limits),
            ("status.used.requests", &self.status.used.requests),
            ("status.used.limits", &self.status.used.limits),
        ]
    }
}
