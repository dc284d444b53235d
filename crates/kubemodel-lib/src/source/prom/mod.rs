//! Prometheus-compatible metrics source

mod client;
mod config;
mod source;

#[cfg(test)]
mod tests;

pub use client::{PrometheusClient, SeriesKeys, HEADER_X_SCOPE_ORG_ID};
pub use config::{ClientAuth, PrometheusConfig, RateLimitRetry};
pub use source::{PrometheusSource, CLUSTER_NAMESPACE};
