//! Exporter configuration
//!
//! Loaded from an optional TOML file (`KUBEMODEL_CONFIG`, default
//! `kubemodel-exporter.toml`) overlaid with `KUBEMODEL_*` environment
//! variables. Nested keys use `__`, e.g. `KUBEMODEL_PROMETHEUS__SERVER_ENDPOINT`.

use anyhow::{bail, Context, Result};
use kubemodel_lib::codec::{BinaryEncoder, Encoder, JsonEncoder};
use kubemodel_lib::compute::ClusterIdentity;
use kubemodel_lib::exporter::{default_pipeline_export_resolutions, duration_string, parse_duration_label};
use kubemodel_lib::model::{DiagnosticLevel, KubeModelSet};
use kubemodel_lib::source::prom::PrometheusConfig;
use kubemodel_lib::storage::StorageConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "KUBEMODEL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "kubemodel-exporter.toml";
const ENV_PREFIX: &str = "KUBEMODEL";

/// Artifact encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Binary,
    Json,
}

impl Encoding {
    pub fn encoder(&self) -> Arc<dyn Encoder<KubeModelSet>> {
        match self {
            Encoding::Binary => Arc::new(BinaryEncoder),
            Encoding::Json => Arc::new(JsonEncoder),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Seconds between controller ticks.
    pub interval_secs: u64,
    /// Window sizes to export, e.g. `1h` and `24h`.
    pub resolutions: Vec<String>,
    /// Prefix for artifact paths inside the storage backend.
    pub root_dir: String,
    pub encoding: Encoding,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            resolutions: default_pipeline_export_resolutions()
                .into_iter()
                .map(duration_string)
                .collect(),
            root_dir: String::new(),
            encoding: Encoding::Binary,
        }
    }
}

impl ExportSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn resolutions(&self) -> Result<Vec<Duration>> {
        self.resolutions
            .iter()
            .map(|label| {
                parse_duration_label(label)
                    .with_context(|| format!("invalid export resolution '{label}'"))
            })
            .collect()
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub cluster: ClusterIdentity,
    pub export: ExportSettings,
    pub prometheus: PrometheusConfig,
    pub storage: StorageConfig,
    /// Port serving `/healthz`, `/readyz` and `/metrics`.
    pub api_port: u16,
    pub diagnostic_level: DiagnosticLevel,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterIdentity::default(),
            export: ExportSettings::default(),
            prometheus: PrometheusConfig::default(),
            storage: StorageConfig::default(),
            api_port: 9005,
            diagnostic_level: DiagnosticLevel::default(),
        }
    }
}

impl ExporterConfig {
    /// Load from the configured file and the process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path, None)
    }

    /// Load from `path` (optional) and `env`, or the process environment
    /// when `env` is `None`.
    pub fn load_from(path: &str, env: Option<HashMap<String, String>>) -> Result<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("export.resolutions")
            .source(env);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(environment)
            .build()
            .context("failed to read configuration")?;

        let config: ExporterConfig = settings
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.uid.trim().is_empty() {
            bail!("cluster.uid is required");
        }
        if self.export.interval_secs == 0 {
            bail!("export.interval_secs must be positive");
        }
        if self.export.resolutions()?.is_empty() {
            bail!("at least one export resolution is required");
        }
        self.prometheus
            .validate()
            .context("invalid prometheus configuration")?;
        Ok(())
    }
}
