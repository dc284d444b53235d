//! Scheduled export of computed sets
//!
//! A [`ComputeExportController`] owns one resolution: on every tick it
//! targets the most recently completed window, computes it through a
//! [`ComputeSource`], encodes it and writes it to [`Storage`] at a
//! deterministic path. Controllers are started and stopped together by a
//! [`ComputeExportControllerGroup`]; [`PipelineExportControllers`] wires
//! the KubeModel pipeline at every configured resolution.
//!
//! [`Storage`]: crate::storage::Storage

mod controller;
mod group;
pub mod pathing;
mod pipelines;
mod source;


pub use controller::{ComputeExportController, ExportOutcome, SkipReason};
pub use group::ComputeExportControllerGroup;
pub use pathing::{duration_string, parse_duration_label, StoragePathFormatter};
pub use pipelines::{
    default_pipeline_export_resolutions, gate_resolutions, minimum_export_resolution,
    PipelineExportControllers, PipelinesExportConfig,
};
pub use source::{ComputeSource, ExportSummary, KubeModelComputeSource, KUBE_MODEL_PIPELINE_NAME};
