//! Hosted vs. local detection and model path resolution.

use std::path::{Path, PathBuf};

use referee_core::{EnvironmentConfig, ModelConfig, ServiceConfig};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentProfile {
    pub is_hosted: bool,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    /// Public hostname assigned by the platform, without scheme.
    pub public_host: Option<String>,
}

impl EnvironmentProfile {
    pub fn platform(&self) -> &'static str { if self.is_hosted { "railway" } else { "local" } }
    pub fn public_url(&self) -> Option<String> { self.public_host.as_ref().map(|h| format!("https://{h}")) }
    pub fn model_url_configured(&self) -> bool { self.model_url.is_some() }
}

/// Classifies the runtime from `lookup` (environment) and the marker path.
/// A hosted indicator only has to be present, its value is irrelevant.
pub fn resolve<F>(env: &EnvironmentConfig, model: &ModelConfig, lookup: F) -> EnvironmentProfile
where
    F: Fn(&str) -> Option<String>,
{
    let is_hosted = env.hosted_env_vars.iter().any(|name| lookup(name).is_some())
        || Path::new(&env.hosted_marker).exists();
    let model_path = if is_hosted { &model.hosted_path } else { &model.local_path };
    EnvironmentProfile {
        is_hosted,
        model_path: PathBuf::from(model_path),
        model_url: model.url.clone().filter(|u| !u.trim().is_empty()),
        public_host: lookup(&env.public_url_var).filter(|v| !v.is_empty()),
    }
}

pub fn detect(cfg: &ServiceConfig) -> EnvironmentProfile {
    resolve(&cfg.environment, &cfg.model, |name| std::env::var(name).ok())
}
