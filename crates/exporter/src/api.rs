//! Health, readiness and scrape endpoints of the exporter
//!
//! `/readyz` stays unavailable until the export controllers are running.
//! `/metrics` renders the exporter's Prometheus registry.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use kubemodel_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::ExporterMetrics,
};
use std::sync::Arc;
use tracing::error;

/// State shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: ExporterMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

fn status_for(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// A degraded exporter still writes artifacts, so only unhealthy fails.
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health_registry.health().await;
    let status = status_for(report.status != ComponentStatus::Unhealthy);
    (status, Json(report)).into_response()
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.health_registry.readiness().await;
    (status_for(readiness.ready), Json(readiness)).into_response()
}

async fn scrape(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(scrape))
        .with_state(state)
}
