use super::controller::ComputeExportController;
use super::group::ComputeExportControllerGroup;
use super::pathing::duration_string;
use super::source::KubeModelComputeSource;
use crate::codec::Encoder;
use crate::compute::KubeModel;
use crate::health::HealthRegistry;
use crate::model::KubeModelSet;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Hourly and daily.
pub fn default_pipeline_export_resolutions() -> Vec<Duration> {
    vec![Duration::from_secs(3600), Duration::from_secs(24 * 3600)]
}

/// Export resolutions per pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinesExportConfig {
    pub cluster_uid: String,
    pub cluster_name: String,
    /// Optional prefix for every artifact path.
    pub root_dir: String,
    pub kube_model_resolutions: Vec<Duration>,
}

impl PipelinesExportConfig {
    pub fn new(cluster_uid: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_uid: cluster_uid.into(),
            cluster_name: cluster_name.into(),
            root_dir: String::new(),
            kube_model_resolutions: default_pipeline_export_resolutions(),
        }
    }
}

/// Source resolution rounded down to whole minutes, at least one minute.
pub fn minimum_export_resolution(source_resolution: Duration) -> Duration {
    let mins = (source_resolution.as_secs() / 60).max(1);
    Duration::from_secs(mins * 60)
}

/// Resolutions an exporter can be configured for. Anything finer than the
/// source resolution is dropped with a warning; equal resolutions are kept.
pub fn gate_resolutions(
    pipeline: &str,
    resolutions: &[Duration],
    source_resolution: Duration,
) -> Vec<Duration> {
    let minimum = minimum_export_resolution(source_resolution);
    resolutions
        .iter()
        .copied()
        .filter(|res| {
            if *res < minimum {
                warn!(
                    "Configured {} pipeline resolution {}m is less than source resolution {}m. Not configuring the exporter for this resolution.",
                    pipeline,
                    res.as_secs() / 60,
                    minimum.as_secs() / 60
                );
                return false;
            }
            true
        })
        .collect()
}

/// Export controllers of every configured pipeline.
#[derive(Debug)]
pub struct PipelineExportControllers {
    pub kube_model: ComputeExportControllerGroup<KubeModelSet>,
}

impl PipelineExportControllers {
    pub fn new(
        storage: Arc<dyn Storage>,
        model: Arc<KubeModel>,
        encoder: Arc<dyn Encoder<KubeModelSet>>,
        config: &PipelinesExportConfig,
        health: Option<HealthRegistry>,
    ) -> Self {
        let source = Arc::new(KubeModelComputeSource::new(Arc::clone(&model)));
        let resolutions =
            gate_resolutions("KubeModel", &config.kube_model_resolutions, model.resolution());

        let mut controllers = Vec::with_capacity(resolutions.len());
        for res in resolutions {
            let controller = ComputeExportController::new(
                &config.cluster_uid,
                &config.root_dir,
                Arc::clone(&storage),
                source.clone(),
                Arc::clone(&encoder),
                res,
            );
            match controller {
                Ok(controller) => controllers.push(match &health {
                    Some(registry) => controller.with_health(registry.clone()),
                    None => controller,
                }),
                Err(err) => {
                    error!(
                        resolution = %duration_string(res),
                        error = %err,
                        "Failed to create KubeModel export controller"
                    );
                }
            }
        }

        Self {
            kube_model: ComputeExportControllerGroup::new(controllers),
        }
    }

    pub fn start(&mut self, interval: Duration) {
        self.kube_model.start(interval);
    }

    pub async fn stop(&mut self) {
        self.kube_model.stop().await;
    }

    /// Labels of every running resolution, e.g. `["1h", "24h"]`.
    pub fn resolution_labels(&self) -> Vec<String> {
        self.kube_model
            .controllers()
            .iter()
            .map(|c| c.resolution_label().to_string())
            .collect()
    }
}
