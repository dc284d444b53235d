use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A container with allocation, request and usage counters.
///
/// CPU counters are in millicores (or millicore-seconds), memory and
/// storage counters in bytes (or byte-seconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub uid: String,
    pub pod_uid: String,
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub cpu_millicore_seconds_allocated: u64,
    pub cpu_millicore_request_average_allocated: u64,
    pub cpu_millicore_usage_average: u64,
    pub cpu_millicore_usage_max: u64,
    pub ram_byte_seconds_allocated: u64,
    pub ram_byte_request_average_allocated: u64,
    pub ram_byte_usage_average: u64,
    pub ram_byte_usage_max: u64,
    pub storage_byte_seconds_allocated: u64,
    pub storage_byte_request_average_allocated: u64,
    pub storage_byte_usage_average: u64,
    pub storage_byte_usage_max: u64,
}
