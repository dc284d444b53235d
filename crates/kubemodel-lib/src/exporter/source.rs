use crate::compute::KubeModel;
use crate::error::ComputeError;
use crate::model::{Diagnostic, KubeModelSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pipeline name used in storage paths for KubeModel artifacts.
pub const KUBE_MODEL_PIPELINE_NAME: &str = "kubemodel";

/// Something an export controller can compute for a window.
#[async_trait]
pub trait ComputeSource<T>: Send + Sync {
    /// Whether this source can produce a value for `[start, end)`. A source
    /// that cannot cover the range reports it here instead of failing in
    /// [`ComputeSource::compute`].
    fn can_compute(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool;

    async fn compute(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<T, ComputeError>;

    /// Name used as a path segment and in logs.
    fn name(&self) -> &str;
}

/// Summary of an exported value, used for metrics and logs.
pub trait ExportSummary {
    fn object_count(&self) -> u64;

    fn diagnostics(&self) -> &[Diagnostic];
}

impl ExportSummary for KubeModelSet {
    fn object_count(&self) -> u64 {
        self.metadata.object_count
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        &self.metadata.diagnostics
    }
}

/// Adapts [`KubeModel`] to [`ComputeSource`].
#[derive(Debug, Clone)]
pub struct KubeModelComputeSource {
    model: Arc<KubeModel>,
}

impl KubeModelComputeSource {
    pub fn new(model: Arc<KubeModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ComputeSource<KubeModelSet> for KubeModelComputeSource {
    fn can_compute(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> bool {
        true
    }

    async fn compute(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<KubeModelSet, ComputeError> {
        self.model.compute_kube_model_set(start, end, cancel).await
    }

    fn name(&self) -> &str {
        KUBE_MODEL_PIPELINE_NAME
    }
}
