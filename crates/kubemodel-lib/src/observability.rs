//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus metrics (compute latency, export outcomes, artifact size, diagnostics)
//! - Structured JSON logging with tracing

use crate::model::{Diagnostic, DiagnosticLevel};
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for compute runs (in seconds)
const COMPUTE_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    compute_duration_seconds: HistogramVec,
    exports: IntCounterVec,
    artifact_size_bytes: IntGaugeVec,
    exported_objects: IntGaugeVec,
    diagnostics: IntCounterVec,
    storage_errors: IntCounterVec,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            compute_duration_seconds: register_histogram_vec!(
                "kubemodel_exporter_compute_duration_seconds",
                "Time spent computing a KubeModelSet for one window",
                &["resolution"],
                COMPUTE_BUCKETS.to_vec()
            )
            .expect("Failed to register compute_duration_seconds"),

            exports: register_int_counter_vec!(
                "kubemodel_exporter_exports_total",
                "Export attempts by resolution and outcome",
                &["resolution", "outcome"]
            )
            .expect("Failed to register exports_total"),

            artifact_size_bytes: register_int_gauge_vec!(
                "kubemodel_exporter_artifact_size_bytes",
                "Size of the last written artifact",
                &["resolution"]
            )
            .expect("Failed to register artifact_size_bytes"),

            exported_objects: register_int_gauge_vec!(
                "kubemodel_exporter_exported_objects",
                "Object count of the last exported KubeModelSet",
                &["resolution"]
            )
            .expect("Failed to register exported_objects"),

            diagnostics: register_int_counter_vec!(
                "kubemodel_exporter_diagnostics_total",
                "Diagnostics recorded in exported sets",
                &["level"]
            )
            .expect("Failed to register diagnostics_total"),

            storage_errors: register_int_counter_vec!(
                "kubemodel_exporter_storage_errors_total",
                "Failed storage operations by backend",
                &["storage"]
            )
            .expect("Failed to register storage_errors_total"),
        }
    }
}

/// Lightweight handle to the global exporter metrics.
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExporterMetrics")
    }
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new)
    }

    pub fn observe_compute_duration(&self, resolution: &str, duration_secs: f64) {
        self.inner()
            .compute_duration_seconds
            .with_label_values(&[resolution])
            .observe(duration_secs);
    }

    /// Count one export attempt; `outcome` is e.g. `exported`, `skipped` or `failed`.
    pub fn inc_export(&self, resolution: &str, outcome: &str) {
        self.inner()
            .exports
            .with_label_values(&[resolution, outcome])
            .inc();
    }

    pub fn export_count(&self, resolution: &str, outcome: &str) -> u64 {
        self.inner()
            .exports
            .with_label_values(&[resolution, outcome])
            .get()
    }

    /// Record size and contents of a written artifact.
    pub fn record_artifact(
        &self,
        resolution: &str,
        bytes: usize,
        object_count: u64,
        diagnostics: &[Diagnostic],
    ) {
        let inner = self.inner();
        inner
            .artifact_size_bytes
            .with_label_values(&[resolution])
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
        inner
            .exported_objects
            .with_label_values(&[resolution])
            .set(i64::try_from(object_count).unwrap_or(i64::MAX));

        for diagnostic in diagnostics {
            inner
                .diagnostics
                .with_label_values(&[diagnostic.level.as_str()])
                .inc();
        }
    }

    pub fn diagnostic_count(&self, level: DiagnosticLevel) -> u64 {
        self.inner()
            .diagnostics
            .with_label_values(&[level.as_str()])
            .get()
    }

    pub fn inc_storage_errors(&self, storage: &str) {
        self.inner().storage_errors.with_label_values(&[storage]).inc();
    }

    /// Content type of [`ExporterMetrics::render`].
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<Vec<u8>> {
        self.inner();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for exporter events
///
/// Every record carries an `event` tag and the cluster key so export
/// history can be followed in aggregated JSON logs.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    cluster_key: String,
}

impl StructuredLogger {
    pub fn new(cluster_key: impl Into<String>) -> Self {
        Self {
            cluster_key: cluster_key.into(),
        }
    }

    pub fn cluster_key(&self) -> &str {
        &self.cluster_key
    }

    pub fn log_export_completed(
        &self,
        source: &str,
        resolution: &str,
        path: &str,
        bytes: usize,
        object_count: u64,
        diagnostics: usize,
    ) {
        info!(
            event = "export_completed",
            cluster = %self.cluster_key,
            source = %source,
            resolution = %resolution,
            path = %path,
            bytes = bytes,
            object_count = object_count,
            diagnostics = diagnostics,
            "Exported artifact"
        );
    }

    pub fn log_export_skipped(&self, source: &str, resolution: &str, reason: &str) {
        info!(
            event = "export_skipped",
            cluster = %self.cluster_key,
            source = %source,
            resolution = %resolution,
            reason = %reason,
            "Skipped export"
        );
    }

    /// `stage` names where the export broke off: `compute`, `encode` or `storage`.
    pub fn log_export_failed(&self, source: &str, resolution: &str, stage: &str, error: &str) {
        warn!(
            event = "export_failed",
            cluster = %self.cluster_key,
            source = %source,
            resolution = %resolution,
            stage = %stage,
            error = %error,
            "Export failed"
        );
    }

    pub fn log_startup(&self, version: &str, resolutions: &[String]) {
        info!(
            event = "exporter_started",
            cluster = %self.cluster_key,
            exporter_version = %version,
            resolutions = ?resolutions,
            "KubeModel exporter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            cluster = %self.cluster_key,
            reason = %reason,
            "KubeModel exporter shutting down"
        );
    }
}
