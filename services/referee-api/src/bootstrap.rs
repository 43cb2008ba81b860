//! Degraded-mode bootstrap: import the detection stack, fetch and load the
//! model, and record what worked. Nothing here aborts the process.

use std::sync::Arc;

use referee_core::{BootstrapPhase, BootstrapState, METRICS};
use tracing::{error, info, warn};

use crate::acquisition::ModelAcquirer;
use crate::compat::CompatPatches;
use crate::environment::EnvironmentProfile;
use crate::readiness::{Capability, DegradedReason, ReadinessState};
use crate::stack::{DetectionStack, ImportError};

fn step(fsm: &mut BootstrapState, next: BootstrapPhase) {
    if let Err(e) = fsm.advance(next) {
        warn!(target: "referee-api", error=%e, "bootstrap transition rejected");
    }
}

fn finish(profile: EnvironmentProfile, mut fsm: BootstrapState, capability: Capability) -> ReadinessState {
    let terminal = if matches!(capability, Capability::Full(_)) { BootstrapPhase::Ready } else { BootstrapPhase::Degraded };
    step(&mut fsm, terminal);
    METRICS.model_loaded.set(matches!(capability, Capability::Full(_)) as i64);
    info!(target: "referee-api", phase=%fsm.phase(), "bootstrap finished");
    ReadinessState::new(profile, capability, fsm.report())
}

pub async fn bootstrap(
    profile: EnvironmentProfile,
    stack: Arc<dyn DetectionStack>,
    patches: &CompatPatches,
    acquirer: &ModelAcquirer,
) -> ReadinessState {
    let mut fsm = BootstrapState::new();
    info!(
        target: "referee-api",
        version = env!("CARGO_PKG_VERSION"),
        platform = profile.platform(),
        model_path = %profile.model_path.display(),
        stack = stack.name(),
        "AI basketball referee API starting"
    );

    step(&mut fsm, BootstrapPhase::DependencyCheck);
    let import = {
        let stack = stack.clone();
        let patches = patches.clone();
        tokio::task::spawn_blocking(move || stack.import(&patches))
            .await
            .unwrap_or_else(|e| Err(ImportError(format!("detection stack import panicked: {e}"))))
    };
    if let Err(ImportError(message)) = import {
        METRICS.dependencies_available.set(0);
        warn!(target: "referee-api", error=%message, "ML dependencies not available");
        info!(target: "referee-api", "running in LIMITED MODE - API endpoints only");
        return finish(profile, fsm, Capability::Degraded(DegradedReason::DependenciesUnavailable { error: message }));
    }
    METRICS.dependencies_available.set(1);
    info!(target: "referee-api", "ML dependencies loaded");

    step(&mut fsm, BootstrapPhase::ModelAcquisition);
    if profile.is_hosted && !profile.model_path.exists() {
        // a failed download just means the load below has nothing to load
        let _ = acquirer.ensure_model(&profile.model_path, profile.model_url.as_deref()).await;
    }
    if !profile.model_path.exists() {
        info!(target: "referee-api", path=%profile.model_path.display(), "no model file, scoring disabled");
        return finish(profile, fsm, Capability::Degraded(DegradedReason::ModelNotLoaded));
    }

    step(&mut fsm, BootstrapPhase::ModelLoad);
    info!(target: "referee-api", "loading model");
    let built = {
        let stack = stack.clone();
        let path = profile.model_path.clone();
        tokio::task::spawn_blocking(move || stack.build_scorer(&path))
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("scorer construction panicked: {e}")))
    };
    match built {
        Ok(scorer) => {
            info!(target: "referee-api", scorer = %scorer.describe(), "model loaded");
            finish(profile, fsm, Capability::Full(scorer))
        }
        Err(e) => {
            error!(target: "referee-api", error=%e, "failed to load model");
            finish(profile, fsm, Capability::Degraded(DegradedReason::ModelNotLoaded))
        }
    }
}
