use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cluster node with its allocation and usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uid: String,
    pub cluster_uid: String,
    /// Cloud provider's identifier for the backing instance.
    pub provider_resource_uid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub cpu_millicore_seconds_allocated: u64,
    pub ram_byte_seconds_allocated: u64,
    pub public_ip_seconds_allocated: u64,
    pub cpu_millicore_usage_average: u64,
    pub cpu_millicore_usage_max: u64,
    pub ram_byte_usage_average: u64,
    pub ram_byte_usage_max: u64,
}
