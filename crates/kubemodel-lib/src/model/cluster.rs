use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Cloud provider hosting the cluster.
    pub enum Provider: "provider" {
        Empty => "",
        Aws => "aws",
        Gcp => "gcp",
        Azure => "azure",
        Alibaba => "alibaba",
        DigitalOcean => "digitalocean",
        Oracle => "oracle",
        OnPremises => "on_premises",
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Empty
    }
}

/// Root of the entity graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub uid: String,
    pub name: String,
    pub provider: Provider,
    pub account: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
