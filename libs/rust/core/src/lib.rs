//! Core shared utilities for the referee scoring service.

use axum::{http::{header, StatusCode}, response::IntoResponse, routing::get, Json, Router};

pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod telemetry;

pub use crate::config::{load_config, build_config, ServiceConfig, EnvironmentConfig, ModelConfig, CompatConfig, SuppressRule};
pub use crate::lifecycle::{BootstrapState, BootstrapPhase, BootstrapReport, LifecycleError};
pub use crate::metrics::{ServiceMetrics, METRICS};
pub use crate::telemetry::{init_tracing, shutdown_tracing, WarningFilters, SuppressWarnings, WARNING_FILTERS};

/// Liveness never depends on readiness: if the process answers, it is healthy.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

pub async fn metrics_handler() -> axum::response::Response {
    match METRICS.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!(error=?e, "metrics encode failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response()
        }
    }
}

/// `/health` and `/metrics`, mergeable into any service router.
pub fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
}
