//! KubeModel compute-and-export library
//!
//! This crate provides:
//! - The KubeModelSet entity graph and its registration protocol
//! - A versioned binary codec for exported artifacts
//! - Metrics-source queries and the parallel compute pipeline
//! - Scheduled export controllers and pluggable storage
//! - Health checks and observability

pub mod codec;
pub mod compute;
pub mod currency;
pub mod error;
pub mod exporter;
pub mod filter;
pub mod health;
pub mod model;
pub mod observability;
pub mod source;
pub mod storage;

pub use compute::{ClusterIdentity, KubeModel};
pub use error::{CodecError, ComputeError, ExportError, KubeModelError, SourceError, StorageError};
pub use exporter::{
    ComputeExportController, ComputeExportControllerGroup, ComputeSource, KubeModelComputeSource,
    PipelineExportControllers, PipelinesExportConfig,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use model::KubeModelSet;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use storage::{Storage, StorageConfig};
