//! Layered service configuration: built-in defaults, an optional config file,
//! `REFEREE__*` environment overrides and the plain `PORT` / `MODEL_URL`
//! variables the hosting platform sets.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const CONFIG_FILE_VAR: &str = "REFEREE_CONFIG_FILE";
pub const ENV_PREFIX: &str = "REFEREE";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_upload_bytes: usize,
    pub environment: EnvironmentConfig,
    pub model: ModelConfig,
    pub compat: CompatConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "referee-api".into(),
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            max_upload_bytes: 512 * 1024 * 1024,
            environment: EnvironmentConfig::default(),
            model: ModelConfig::default(),
            compat: CompatConfig::default(),
        }
    }
}

/// Hosted-platform detection inputs.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub hosted_env_vars: Vec<String>,
    pub hosted_marker: String,
    pub public_url_var: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            hosted_env_vars: vec!["RAILWAY_ENVIRONMENT".into(), "RAILWAY_STATIC_URL".into()],
            hosted_marker: "/app".into(),
            public_url_var: "RAILWAY_STATIC_URL".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub hosted_path: String,
    pub local_path: String,
    pub url: Option<String>,
    /// Unset means the download may take as long as it takes.
    pub download_timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hosted_path: "/app/models/best.onnx".into(),
            local_path: "runs/detect/train3/weights/best.onnx".into(),
            url: None,
            download_timeout_secs: None,
        }
    }
}

/// One warning suppression rule. Both fields set means both must match.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SuppressRule {
    pub target: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompatConfig {
    pub enabled: bool,
    pub suppress: Vec<SuppressRule>,
    pub quiet_env: BTreeMap<String, String>,
    pub incompatible_major: u64,
}

impl Default for CompatConfig {
    fn default() -> Self {
        let mut quiet_env = BTreeMap::new();
        quiet_env.insert("PYTHONWARNINGS".to_string(), "ignore".to_string());
        quiet_env.insert("OPENCV_LOG_LEVEL".to_string(), "ERROR".to_string());
        Self {
            enabled: true,
            suppress: vec![
                SuppressRule { target: None, message: Some(".*NumPy.*".into()) },
                SuppressRule { target: None, message: Some(".*numpy.*".into()) },
                SuppressRule { target: Some("tract".into()), message: None },
            ],
            quiet_env,
            incompatible_major: 2,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Reads the process environment (and the optional config file) once.
pub fn load_config(service: &str) -> Result<ServiceConfig> {
    let file = non_empty_env(CONFIG_FILE_VAR);
    build_config(service, file.as_deref(), None, non_empty_env("PORT"), non_empty_env("MODEL_URL"))
}

/// `env` replaces the process environment as the source of `REFEREE__*`
/// overrides when given.
pub fn build_config(
    service: &str,
    file: Option<&str>,
    env: Option<config::Map<String, String>>,
    port: Option<String>,
    model_url: Option<String>,
) -> Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?;
    if let Some(file) = file {
        builder = builder.add_source(config::File::with_name(file).required(false));
    }
    builder = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .source(env),
        )
        .set_override_option("port", port)?
        .set_override_option("model.url", model_url)?;
    let mut cfg: ServiceConfig = builder.build()?.try_deserialize()?;
    // a blank URL in a file or REFEREE__MODEL__URL is as good as none
    if cfg.model.url.as_deref().map(|u| u.trim().is_empty()).unwrap_or(false) {
        cfg.model.url = None;
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> Option<config::Map<String, String>> {
        Some(config::Map::new())
    }

    #[test]
    fn defaults_match_platform_conventions() {
        let cfg = build_config("referee-api", None, no_env(), None, None).unwrap();
        assert_eq!(cfg.service_name, "referee-api");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.model.hosted_path, "/app/models/best.onnx");
        assert_eq!(cfg.environment.hosted_marker, "/app");
        assert!(cfg.environment.hosted_env_vars.contains(&"RAILWAY_ENVIRONMENT".to_string()));
        assert_eq!(cfg.compat.incompatible_major, 2);
        assert!(cfg.compat.enabled);
    }

    #[test]
    fn port_and_model_url_override() {
        let cfg = build_config("referee-api", None, no_env(), Some("9123".into()), Some("https://models.example/best.onnx".into())).unwrap();
        assert_eq!(cfg.port, 9123);
        assert_eq!(cfg.model.url.as_deref(), Some("https://models.example/best.onnx"));
    }

    #[test]
    fn file_source_is_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "log_level: debug\nmodel:\n  local_path: /tmp/weights.onnx\n  url: \"\"").unwrap();
        let cfg = build_config("referee-api", path.to_str(), no_env(), None, None).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.model.local_path, "/tmp/weights.onnx");
        assert!(cfg.model.url.is_none());
        // untouched sections keep their defaults
        assert_eq!(cfg.model.hosted_path, "/app/models/best.onnx");
    }

    #[test]
    fn double_underscore_env_reaches_nested_fields() {
        let env = [
            ("REFEREE__MODEL__HOSTED_PATH", "/srv/models/court.onnx"),
            ("REFEREE__MODEL__DOWNLOAD_TIMEOUT_SECS", "45"),
            ("REFEREE__MAX_UPLOAD_BYTES", "1048576"),
            ("UNRELATED__MODEL__HOSTED_PATH", "/ignored.onnx"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let cfg = build_config("referee-api", None, Some(env), None, None).unwrap();
        assert_eq!(cfg.model.hosted_path, "/srv/models/court.onnx");
        assert_eq!(cfg.model.download_timeout_secs, Some(45));
        assert_eq!(cfg.max_upload_bytes, 1024 * 1024);
        assert_eq!(cfg.model.local_path, "runs/detect/train3/weights/best.onnx");
    }

    #[test]
    fn explicit_port_wins_over_env_override() {
        let env = [("REFEREE__PORT".to_string(), "7000".to_string())].into_iter().collect();
        let cfg = build_config("referee-api", None, Some(env), Some("9000".into()), None).unwrap();
        assert_eq!(cfg.port, 9000);
    }
}
