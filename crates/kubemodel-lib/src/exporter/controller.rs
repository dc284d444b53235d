use super::pathing::{duration_string, StoragePathFormatter};
use super::source::{ComputeSource, ExportSummary};
use crate::codec::Encoder;
use crate::error::{ComputeError, ExportError, StorageError};
use crate::health::{components, HealthRegistry};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a tick did not write anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The target window was already handled by this controller.
    SameWindow,
    /// The source cannot cover the target window.
    CannotCompute,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SameWindow => "window already exported",
            SkipReason::CannotCompute => "source cannot compute window",
        }
    }
}

/// Result of one export attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported { path: String, bytes: usize },
    /// An artifact for the window was found in storage.
    AlreadyExported { path: String },
    Skipped(SkipReason),
}

/// Computes and stores one artifact per completed window at a fixed
/// resolution.
pub struct ComputeExportController<T> {
    source: Arc<dyn ComputeSource<T>>,
    encoder: Arc<dyn Encoder<T>>,
    storage: Arc<dyn Storage>,
    resolution: Duration,
    label: String,
    paths: StoragePathFormatter,
    last_export: Mutex<Option<DateTime<Utc>>>,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl<T> std::fmt::Debug for ComputeExportController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeExportController")
            .field("source", &self.source.name())
            .field("resolution", &self.label)
            .field("dir", &self.paths.dir())
            .field("storage", &self.storage.storage_type())
            .finish()
    }
}

impl<T> ComputeExportController<T>
where
    T: ExportSummary + Send + Sync + 'static,
{
    pub fn new(
        cluster_key: &str,
        root_dir: &str,
        storage: Arc<dyn Storage>,
        source: Arc<dyn ComputeSource<T>>,
        encoder: Arc<dyn Encoder<T>>,
        resolution: Duration,
    ) -> Result<Self, ExportError> {
        if resolution.as_secs() == 0 {
            return Err(ExportError::Config(
                "export resolution must be at least one second".to_string(),
            ));
        }

        let label = duration_string(resolution);
        let paths = StoragePathFormatter::new(root_dir, cluster_key, source.name(), &label)?;

        debug!(
            source = %source.name(),
            resolution = %label,
            dir = %paths.dir(),
            storage = %storage.storage_type(),
            "Created export controller"
        );

        Ok(Self {
            source,
            encoder,
            storage,
            resolution,
            label,
            paths,
            last_export: Mutex::new(None),
            metrics: ExporterMetrics::new(),
            logger: StructuredLogger::new(cluster_key),
            health: None,
        })
    }

    /// Report component health to `registry` after each attempt.
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    pub fn resolution_label(&self) -> &str {
        &self.label
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Start of the last window exported or found in storage.
    pub async fn last_export(&self) -> Option<DateTime<Utc>> {
        *self.last_export.lock().await
    }

    /// Last completed window before `now`: `[floor(now) - res, floor(now))`,
    /// floored relative to the Unix epoch.
    pub fn target_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let res = i64::try_from(self.resolution.as_secs()).unwrap_or(i64::MAX);
        let past_boundary = chrono::Duration::seconds(now.timestamp().rem_euclid(res))
            + chrono::Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
        let end = now - past_boundary;
        (end - chrono::Duration::seconds(res), end)
    }

    /// Storage path of the artifact for the window starting at `start`.
    pub fn path_for(&self, start: DateTime<Utc>) -> String {
        self.paths.to_full_path(start, self.encoder.file_ext())
    }

    pub async fn export(&self, cancel: &CancellationToken) -> Result<ExportOutcome, ExportError> {
        self.export_at(Utc::now(), cancel).await
    }

    /// Export the window that completed most recently before `now`.
    ///
    /// The window is remembered once it is written or found in storage.
    /// Failures leave it unremembered so the next tick tries again.
    pub async fn export_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ExportOutcome, ExportError> {
        let (start, end) = self.target_window(now);
        let mut last_export = self.last_export.lock().await;

        if *last_export == Some(start) {
            return Ok(ExportOutcome::Skipped(SkipReason::SameWindow));
        }
        if !self.source.can_compute(start, end) {
            return Ok(ExportOutcome::Skipped(SkipReason::CannotCompute));
        }

        let path = self.path_for(start);
        if self.storage.exists(&path).await.map_err(|e| self.storage_failed(e))? {
            *last_export = Some(start);
            return Ok(ExportOutcome::AlreadyExported { path });
        }

        let timer = Instant::now();
        let value = self.source.compute(start, end, cancel).await?;
        self.metrics
            .observe_compute_duration(&self.label, timer.elapsed().as_secs_f64());

        let data = self.encoder.encode(&value)?;
        self.storage
            .put(&path, &data)
            .await
            .map_err(|e| self.storage_failed(e))?;
        *last_export = Some(start);

        self.metrics.record_artifact(
            &self.label,
            data.len(),
            value.object_count(),
            value.diagnostics(),
        );
        self.logger.log_export_completed(
            self.source.name(),
            &self.label,
            &path,
            data.len(),
            value.object_count(),
            value.diagnostics().len(),
        );

        Ok(ExportOutcome::Exported {
            path,
            bytes: data.len(),
        })
    }

    fn storage_failed(&self, err: StorageError) -> StorageError {
        self.metrics
            .inc_storage_errors(self.storage.storage_type().as_str());
        err
    }

    /// One scheduled attempt; errors are logged and counted, never returned.
    pub async fn tick(&self, cancel: &CancellationToken) {
        match self.export(cancel).await {
            Ok(ExportOutcome::Exported { .. }) => {
                self.metrics.inc_export(&self.label, "exported");
                self.report(components::EXPORTER, None).await;
                self.report(components::STORAGE, None).await;
            }
            Ok(ExportOutcome::AlreadyExported { path }) => {
                self.metrics.inc_export(&self.label, "skipped");
                self.logger
                    .log_export_skipped(self.source.name(), &self.label, &format!("artifact exists at {path}"));
            }
            Ok(ExportOutcome::Skipped(reason)) => {
                if reason == SkipReason::CannotCompute {
                    self.metrics.inc_export(&self.label, "skipped");
                    self.logger
                        .log_export_skipped(self.source.name(), &self.label, reason.as_str());
                }
            }
            Err(ExportError::Compute(ComputeError::Cancelled)) => {
                info!(source = %self.source.name(), resolution = %self.label, "Export cancelled");
            }
            Err(err) => {
                let stage = match &err {
                    ExportError::Compute(_) => components::COMPUTE,
                    ExportError::Encode(_) => "encode",
                    ExportError::Storage(_) => components::STORAGE,
                    ExportError::Config(_) => "config",
                };
                self.metrics.inc_export(&self.label, "failed");
                self.logger
                    .log_export_failed(self.source.name(), &self.label, stage, &err.to_string());
                self.report(stage, Some(err.to_string())).await;
            }
        }
    }

    async fn report(&self, component: &str, failure: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        if !matches!(component, components::COMPUTE | components::STORAGE | components::EXPORTER) {
            return;
        }
        match failure {
            Some(message) => health.set_degraded(component, message).await,
            None => health.set_healthy(component).await,
        }
    }

    /// Tick every `interval` until `cancel` fires. The interval is
    /// independent of the resolution; ticks inside an exported window are
    /// cheap no-ops.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(
            source = %self.source.name(),
            resolution = %self.label,
            interval_secs = interval.as_secs(),
            "Starting export controller"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(resolution = %self.label, "Stopping export controller");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(&cancel).await;
                }
            }
        }
    }
}
