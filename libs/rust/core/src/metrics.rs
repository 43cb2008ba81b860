//! Prometheus metrics for the referee service, kept in a dedicated registry.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct ServiceMetrics {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub bootstrap_phase_seconds: GaugeVec,
    pub model_loaded: IntGauge,
    pub dependencies_available: IntGauge,
    pub model_download_bytes_total: IntCounter,
}

pub static METRICS: Lazy<ServiceMetrics> = Lazy::new(|| {
    // names and labels below are static and valid, registration happens once
    ServiceMetrics::new().expect("static metric definitions")
});

impl ServiceMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();
        let http_requests_total = IntCounterVec::new(
            Opts::new("referee_http_requests_total", "HTTP requests served, by route and status"),
            &["route", "status"],
        )?;
        let bootstrap_phase_seconds = GaugeVec::new(
            Opts::new("referee_bootstrap_phase_seconds", "Time spent in each bootstrap phase"),
            &["phase"],
        )?;
        let model_loaded = IntGauge::new("referee_model_loaded", "1 when the scorer is loaded")?;
        let dependencies_available = IntGauge::new("referee_dependencies_available", "1 when the detection stack imported")?;
        let model_download_bytes_total = IntCounter::new("referee_model_download_bytes_total", "Bytes written while downloading the model")?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(bootstrap_phase_seconds.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;
        registry.register(Box::new(dependencies_available.clone()))?;
        registry.register(Box::new(model_download_bytes_total.clone()))?;
        Ok(Self { registry, http_requests_total, bootstrap_phase_seconds, model_loaded, dependencies_available, model_download_bytes_total })
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
