//! Startup compatibility shim.
//!
//! Runs once, before the detection stack is imported. It
//! 1. registers warning suppression rules with the tracing layer,
//! 2. exports environment variables downstream libraries read to stay quiet,
//! 3. reads the numeric runtime version and, when its major version is the
//!    known-incompatible one, injects the [`ARRAY_API_PLACEHOLDER`] attribute
//!    the detection stack's import path looks up.
//!
//! Nothing here can fail the caller. Remove the placeholder injection once the
//! detection stack supports the newer numeric runtime.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use referee_core::{CompatConfig, WarningFilters};
use tracing::{info, warn};

/// Attribute the detection stack expects on the numeric runtime. The newer
/// major version dropped it; a placeholder is enough to get through import.
pub const ARRAY_API_PLACEHOLDER: &str = "_ARRAY_API";

/// Source of the installed numeric runtime version string.
pub trait NumericRuntime {
    fn numeric_version(&self) -> anyhow::Result<String>;
}

/// Placeholder attributes injected by the shim, handed to the detection stack
/// at import time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatPatches {
    injected: BTreeSet<String>,
}

impl CompatPatches {
    pub fn has(&self, attr: &str) -> bool { self.injected.contains(attr) }
    pub fn is_empty(&self) -> bool { self.injected.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &str> { self.injected.iter().map(String::as_str) }
    fn inject(&mut self, attr: &str) { self.injected.insert(attr.to_string()); }
}

#[derive(Debug, Clone, Default)]
pub struct CompatReport {
    pub numeric_version: Option<String>,
    pub filters_registered: usize,
    pub env_set: Vec<String>,
    pub patches: CompatPatches,
}

fn major_version(version: &str) -> Option<u64> {
    version.trim().trim_start_matches('v').split('.').next()?.trim().parse().ok()
}

fn valid_env_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('=') && !key.contains('\0')
}

pub fn apply<R: NumericRuntime + ?Sized>(cfg: &CompatConfig, filters: &WarningFilters, runtime: &R) -> CompatReport {
    let mut report = CompatReport::default();
    if !cfg.enabled {
        info!(target: "referee::compat", "compatibility shim disabled");
        return report;
    }

    for rule in &cfg.suppress {
        match filters.register(rule) {
            Ok(()) => report.filters_registered += 1,
            Err(e) => warn!(target: "referee::compat", error=%e, ?rule, "skipping suppress rule"),
        }
    }

    for (key, value) in &cfg.quiet_env {
        if !valid_env_key(key) || value.contains('\0') {
            warn!(target: "referee::compat", %key, "skipping invalid environment entry");
            continue;
        }
        std::env::set_var(key, value);
        report.env_set.push(key.clone());
    }

    match panic::catch_unwind(AssertUnwindSafe(|| runtime.numeric_version())) {
        Ok(Ok(version)) => {
            info!(target: "referee::compat", %version, "numeric runtime version");
            match major_version(&version) {
                Some(major) if major == cfg.incompatible_major => {
                    warn!(target: "referee::compat", major, "incompatible numeric runtime major version, injecting placeholder attributes");
                    report.patches.inject(ARRAY_API_PLACEHOLDER);
                }
                Some(_) => {}
                None => warn!(target: "referee::compat", %version, "unparseable numeric runtime version"),
            }
            report.numeric_version = Some(version);
        }
        Ok(Err(e)) => info!(target: "referee::compat", error=%e, "numeric runtime not installed yet"),
        Err(_) => warn!(target: "referee::compat", "numeric runtime version lookup panicked"),
    }

    info!(
        target: "referee::compat",
        filters = report.filters_registered,
        env = report.env_set.len(),
        patches = ?report.patches.iter().collect::<Vec<_>>(),
        "compatibility shim applied"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use referee_core::SuppressRule;
    use std::collections::BTreeMap;

    struct Fixed(&'static str);
    impl NumericRuntime for Fixed {
        fn numeric_version(&self) -> anyhow::Result<String> { Ok(self.0.to_string()) }
    }

    struct Missing;
    impl NumericRuntime for Missing {
        fn numeric_version(&self) -> anyhow::Result<String> { Err(anyhow!("no numeric runtime")) }
    }

    struct Panics;
    impl NumericRuntime for Panics {
        fn numeric_version(&self) -> anyhow::Result<String> { panic!("version lookup blew up") }
    }

    fn cfg() -> CompatConfig {
        CompatConfig { quiet_env: BTreeMap::new(), ..CompatConfig::default() }
    }

    #[test]
    fn incompatible_major_gets_placeholder() {
        let report = apply(&cfg(), &WarningFilters::default(), &Fixed("2.1.3"));
        assert!(report.patches.has(ARRAY_API_PLACEHOLDER));
        assert_eq!(report.numeric_version.as_deref(), Some("2.1.3"));
    }

    #[test]
    fn compatible_major_is_left_alone() {
        let report = apply(&cfg(), &WarningFilters::default(), &Fixed("1.26.4"));
        assert!(report.patches.is_empty());
    }

    #[test]
    fn version_lookup_failures_never_escape() {
        assert!(apply(&cfg(), &WarningFilters::default(), &Missing).patches.is_empty());
        let report = apply(&cfg(), &WarningFilters::default(), &Panics);
        assert!(report.numeric_version.is_none());
        assert!(report.patches.is_empty());
    }

    // Exporting valid entries mutates the process environment, which other
    // tests in this binary read; tests/compat_env.rs covers that on its own.
    #[test]
    fn registers_filters_and_skips_invalid_env() {
        let mut c = cfg();
        c.suppress.push(SuppressRule::default()); // rejected, must not abort the rest
        c.quiet_env.insert("BAD=KEY".into(), "x".into());
        c.quiet_env.insert(String::new(), "x".into());
        let filters = WarningFilters::default();
        let report = apply(&c, &filters, &Fixed("1.0"));
        assert_eq!(report.filters_registered, CompatConfig::default().suppress.len());
        assert_eq!(filters.len(), report.filters_registered);
        assert!(report.env_set.is_empty());
    }

    #[test]
    fn disabled_shim_does_nothing() {
        let c = CompatConfig { enabled: false, ..cfg() };
        let filters = WarningFilters::default();
        let report = apply(&c, &filters, &Fixed("2.0.0"));
        assert!(filters.is_empty());
        assert!(report.patches.is_empty());
    }

    #[test]
    fn parses_major_versions() {
        assert_eq!(major_version("2.0.0rc1"), Some(2));
        assert_eq!(major_version("v1.26"), Some(1));
        assert_eq!(major_version("dev"), None);
    }
}
