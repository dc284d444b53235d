use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

string_enum! {
    /// Workload controller kind.
    pub enum OwnerKind: "owner kind" {
        Deployment => "deployment",
        StatefulSet => "statefulset",
        DaemonSet => "daemonset",
        Job => "job",
        CronJob => "cronjob",
        ReplicaSet => "replicaset",
    }
}

impl OwnerKind {
    /// Parse a Kubernetes kind as reported by kube-state-metrics
    /// (`Deployment`, `ReplicaSet`, ...), ignoring case.
    pub fn parse_kind(kind: &str) -> Option<Self> {
        let lower = kind.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|k| k.as_str() == lower)
    }
}

/// A workload controller owning pods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub uid: String,
    /// UID of the owning namespace.
    pub owner_uid: String,
    pub name: String,
    pub kind: OwnerKind,
    pub controller: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
