//! KubeModel exporter
//!
//! Runs one deployment per cluster: periodically computes the KubeModel
//! for each completed window from Prometheus and writes the encoded
//! artifact to the configured storage backend.

use anyhow::{Context, Result};
use kubemodel_lib::{
    exporter::{PipelineExportControllers, PipelinesExportConfig},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    source::prom::PrometheusSource,
    KubeModel,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kubemodel-exporter");

    let config = config::ExporterConfig::load()?;
    info!(
        cluster_uid = %config.cluster.uid,
        storage = ?config.storage,
        "Exporter configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_SOURCE).await;
    health_registry.register(components::COMPUTE).await;
    health_registry.register(components::STORAGE).await;
    health_registry.register(components::EXPORTER).await;

    let metrics = ExporterMetrics::new();
    let logger = StructuredLogger::new(&config.cluster.uid);

    // Serve health endpoints before the pipeline is wired so startup failures are visible
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let mut api_handle = tokio::spawn(serve_api(config.api_port, app_state));

    let source = match PrometheusSource::new(&config.prometheus) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            health_registry
                .set_unhealthy(components::METRICS_SOURCE, e.to_string())
                .await;
            return Err(e).context("failed to create prometheus source");
        }
    };

    let model = KubeModel::new(config.cluster.clone(), source)
        .context("failed to create kubemodel")?
        .with_diagnostic_level(config.diagnostic_level);

    let storage = config
        .storage
        .build()
        .context("failed to create storage backend")?;

    let mut pipelines_config =
        PipelinesExportConfig::new(config.cluster.uid.clone(), config.cluster.name.clone());
    pipelines_config.root_dir = config.export.root_dir.clone();
    pipelines_config.kube_model_resolutions = config.export.resolutions()?;

    let mut controllers = PipelineExportControllers::new(
        storage,
        Arc::new(model),
        config.export.encoding.encoder(),
        &pipelines_config,
        Some(health_registry.clone()),
    );

    let resolutions = controllers.resolution_labels();
    if resolutions.is_empty() {
        health_registry
            .set_degraded(components::EXPORTER, "no export resolution is configured")
            .await;
    }
    controllers.start(config.export.interval());
    logger.log_startup(EXPORTER_VERSION, &resolutions);

    health_registry.set_ready(true).await;

    let reason = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            "SIGINT received"
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => "API server exited",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    health_registry.set_ready(false).await;
    controllers.stop().await;
    api_handle.abort();
    logger.log_shutdown(reason);
    info!("Shutting down");

    Ok(())
}

async fn serve_api(port: u16, state: Arc<api::AppState>) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Serving health and metrics endpoints");
    axum::serve(listener, api::create_router(state)).await?;
    Ok(())
}
