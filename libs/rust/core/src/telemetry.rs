//! Tracing setup plus the warning-suppression layer the compatibility shim
//! feeds at startup.

use anyhow::{anyhow, Result};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{info, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::SuppressRule;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide filter set installed into the subscriber by [`init_tracing`].
pub static WARNING_FILTERS: Lazy<WarningFilters> = Lazy::new(WarningFilters::default);

#[derive(Debug, Clone)]
struct CompiledRule {
    target: Option<String>,
    message: Option<Regex>,
}

impl CompiledRule {
    fn matches(&self, target: &str, message: &str) -> bool {
        let target_ok = self.target.as_deref().map(|t| target.starts_with(t)).unwrap_or(true);
        let message_ok = self.message.as_ref().map(|re| re.is_match(message)).unwrap_or(true);
        target_ok && message_ok
    }
}

/// Shared list of suppression rules. Cloning shares the underlying list.
#[derive(Debug, Clone, Default)]
pub struct WarningFilters {
    rules: Arc<RwLock<Vec<CompiledRule>>>,
}

impl WarningFilters {
    /// Registers a rule. A rule with neither target nor message would swallow
    /// every warning and is rejected.
    pub fn register(&self, rule: &SuppressRule) -> Result<()> {
        if rule.target.is_none() && rule.message.is_none() {
            return Err(anyhow!("suppress rule needs a target or a message pattern"));
        }
        let message = match &rule.message {
            Some(pattern) => Some(Regex::new(pattern)?),
            None => None,
        };
        self.rules.write().push(CompiledRule { target: rule.target.clone(), message });
        Ok(())
    }

    pub fn len(&self) -> usize { self.rules.read().len() }
    pub fn is_empty(&self) -> bool { self.rules.read().is_empty() }

    pub fn suppresses(&self, target: &str, message: &str) -> bool {
        self.rules.read().iter().any(|r| r.matches(target, message))
    }

    pub fn layer(&self) -> SuppressWarnings { SuppressWarnings { filters: self.clone() } }
}

/// Drops WARN events matched by a [`WarningFilters`] rule. Other levels pass.
#[derive(Debug, Clone)]
pub struct SuppressWarnings {
    filters: WarningFilters,
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" { self.0 = value.to_string(); }
    }
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" { self.0 = format!("{value:?}"); }
    }
}

impl<S: Subscriber> Layer<S> for SuppressWarnings {
    fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
        if *event.metadata().level() != Level::WARN || self.filters.is_empty() { return true; }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        !self.filters.suppresses(event.metadata().target(), &visitor.0)
    }
}

fn json_requested() -> bool {
    std::env::var("REFEREE_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

fn otlp_endpoint() -> Option<String> {
    std::env::var(OTLP_ENDPOINT_VAR).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(feature = "otlp")]
static TRACER_PROVIDER: OnceCell<opentelemetry_sdk::trace::SdkTracerProvider> = OnceCell::new();

/// Span export over OTLP/HTTP, on only when an endpoint is configured. The
/// batch processor runs on its own thread, so no async runtime is needed yet.
#[cfg(feature = "otlp")]
fn otel_layer<S>(service: &str) -> Result<Option<impl Layer<S>>>
where
    S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider as _;

    if otlp_endpoint().is_none() {
        return Ok(None);
    }
    // the builder reads OTEL_EXPORTER_OTLP_ENDPOINT and appends /v1/traces
    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().build()?;
    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(opentelemetry_sdk::Resource::builder().with_service_name(service.to_string()).build())
        .build();
    let tracer = provider.tracer(service.to_string());
    opentelemetry::global::set_tracer_provider(provider.clone());
    let _ = TRACER_PROVIDER.set(provider);
    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

#[cfg(not(feature = "otlp"))]
fn otel_layer(_service: &str) -> Result<Option<tracing_subscriber::layer::Identity>> {
    Ok(None)
}

/// Flushes buffered spans. A no-op unless OTLP export was started.
#[cfg(feature = "otlp")]
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(target: "referee", error=%e, "span exporter shutdown failed");
        }
    }
}

#[cfg(not(feature = "otlp"))]
pub fn shutdown_tracing() {}

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let json = json_requested();
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(WARNING_FILTERS.layer())
            .with(otel_layer(service)?)
            .with(json_layer)
            .with(text_layer)
            .try_init()?;
        Ok::<(), anyhow::Error>(())
    })?;
    let otlp = otlp_endpoint().is_some();
    info!(target: "referee", service, otlp = otlp && cfg!(feature = "otlp"), "tracing initialized");
    if otlp && !cfg!(feature = "otlp") {
        tracing::warn!(target: "referee", "{OTLP_ENDPOINT_VAR} is set but this build has no `otlp` feature, spans stay local");
    }
    Ok(())
}
