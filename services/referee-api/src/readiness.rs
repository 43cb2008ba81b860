//! Readiness recorded by the bootstrap and shared read-only with handlers.

use std::path::Path;
use std::sync::Arc;

use referee_core::BootstrapReport;

use crate::environment::EnvironmentProfile;
use crate::stack::Scorer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// The detection stack failed to import; the message is kept verbatim.
    DependenciesUnavailable { error: String },
    ModelNotLoaded,
}

#[derive(Debug, Clone)]
pub enum Capability {
    Full(Arc<dyn Scorer>),
    Degraded(DegradedReason),
}

/// Built once by the bootstrap; there are no setters, so nothing can flip a
/// loaded model back to unloaded.
#[derive(Debug)]
pub struct ReadinessState {
    profile: EnvironmentProfile,
    capability: Capability,
    bootstrap: BootstrapReport,
}

impl ReadinessState {
    pub fn new(profile: EnvironmentProfile, capability: Capability, bootstrap: BootstrapReport) -> Self {
        Self { profile, capability, bootstrap }
    }

    pub fn profile(&self) -> &EnvironmentProfile { &self.profile }
    pub fn capability(&self) -> &Capability { &self.capability }
    pub fn bootstrap(&self) -> &BootstrapReport { &self.bootstrap }
    pub fn model_path(&self) -> &Path { &self.profile.model_path }
    pub fn model_url_configured(&self) -> bool { self.profile.model_url_configured() }

    pub fn dependencies_available(&self) -> bool {
        !matches!(self.capability, Capability::Degraded(DegradedReason::DependenciesUnavailable { .. }))
    }

    pub fn import_error(&self) -> Option<&str> {
        match &self.capability {
            Capability::Degraded(DegradedReason::DependenciesUnavailable { error }) => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn model_loaded(&self) -> bool { matches!(self.capability, Capability::Full(_)) }

    /// Gate for capability-dependent entry points.
    pub fn scorer(&self) -> Result<&Arc<dyn Scorer>, &DegradedReason> {
        match &self.capability {
            Capability::Full(scorer) => Ok(scorer),
            Capability::Degraded(reason) => Err(reason),
        }
    }
}
