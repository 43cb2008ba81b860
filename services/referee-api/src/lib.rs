//! HTTP service wrapping the basketball free-throw scoring model.
//!
//! Startup order: compatibility shim (see [`compat`]), environment
//! resolution, bootstrap, then the HTTP surface. The server always comes up,
//! with or without a loaded model.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use referee_core::ServiceConfig;
use tokio::net::TcpListener;
use tracing::info;

pub mod acquisition;
pub mod bootstrap;
pub mod compat;
pub mod environment;
pub mod http;
pub mod readiness;
pub mod stack;

pub use acquisition::{AcquisitionError, ModelAcquirer};
pub use bootstrap::bootstrap;
pub use compat::{CompatPatches, CompatReport, NumericRuntime, ARRAY_API_PLACEHOLDER};
pub use environment::EnvironmentProfile;
pub use http::{router, ApiError, AppState};
pub use readiness::{Capability, DegradedReason, ReadinessState};
pub use stack::{DetectionStack, ImportError, OnnxStack, Scorer};

/// Bootstraps and serves until a shutdown signal arrives.
pub async fn run(cfg: ServiceConfig, stack: Arc<dyn DetectionStack>, patches: CompatPatches) -> Result<()> {
    let profile = environment::detect(&cfg);
    let acquirer = ModelAcquirer::new(cfg.model.download_timeout_secs.map(Duration::from_secs))?;
    let readiness = bootstrap(profile, stack, &patches, &acquirer).await;
    let app = router(AppState::new(readiness), cfg.max_upload_bytes);
    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port)).await?;
    info!(target: "referee-api", addr = %listener.local_addr()?, "starting server");
    serve(listener, app).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!(target: "referee-api", "shutting down API");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error=?e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::warn!(error=?e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "referee-api", "shutdown signal received");
}
