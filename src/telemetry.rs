//! Stderr logging and optional OTLP spans around the phases of a run.

use anyhow::{Context, Result, anyhow, bail};
use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider as OtelTracerProvider};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, SpanExporter,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::processor::OverlayKind;

const TRACES_PATH: &str = "/v1/traces";
const SIGNAL_PATHS: [&str; 3] = ["/v1/traces", "/v1/logs", "/v1/metrics"];

/// A traced phase of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Phase {
    Run,
    ClasspathScan,
    JarScan,
    ClassParse,
    PlatformOverlays,
    UserOverlays,
    /// Parsing and merging a single overlay file.
    OverlayFile,
    /// A platform overlay loaded because a class it describes was first queried.
    OnDemandOverlay,
    Results,
    Export,
}

impl Phase {
    pub(crate) fn span_name(self) -> &'static str {
        match self {
            Phase::Run => "stubweave.run",
            Phase::ClasspathScan => "classpath.scan",
            Phase::JarScan => "jar.scan",
            Phase::ClassParse => "class.parse",
            Phase::PlatformOverlays => "overlay.platform",
            Phase::UserOverlays => "overlay.user",
            Phase::OverlayFile => "overlay.merge",
            Phase::OnDemandOverlay => "overlay.on_demand",
            Phase::Results => "overlay.results",
            Phase::Export => "export",
        }
    }
}

/// Span attributes naming one overlay file and its precedence kind.
pub(crate) fn overlay_attributes(name: &str, kind: OverlayKind) -> [KeyValue; 2] {
    [
        KeyValue::new("stubweave.overlay", name.to_string()),
        KeyValue::new("stubweave.overlay_kind", kind.label()),
    ]
}

/// OTLP tracer for the scan, load and merge phases.
pub(crate) struct Telemetry {
    tracer: opentelemetry_sdk::trace::SdkTracer,
    provider: SdkTracerProvider,
}

impl Telemetry {
    /// Export spans over OTLP/HTTP to `endpoint`.
    pub(crate) fn new(endpoint: String) -> Result<Self> {
        let endpoint = trace_endpoint(&endpoint)?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("build OTLP span exporter")?;
        Self::from_exporter(exporter)
    }

    fn in_phase<T, F>(&self, phase: Phase, attributes: &[KeyValue], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.tracer.in_span(phase.span_name(), |cx| {
            let span = cx.span();
            for attribute in attributes {
                span.set_attribute(attribute.clone());
            }
            f()
        })
    }

    /// Flush pending spans.
    pub(crate) fn shutdown(&self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|err| anyhow!("failed to shut down tracer provider: {err}"))
    }

    fn from_exporter<E: SpanExporter + 'static>(exporter: E) -> Result<Self> {
        let resource = Resource::builder().with_service_name("stubweave").build();
        // Spans are ended from rayon workers while class files are parsed.
        let batch_config = BatchConfigBuilder::default()
            .with_max_queue_size(16_384)
            .with_max_export_batch_size(2048)
            .with_scheduled_delay(Duration::from_millis(200))
            .build();
        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(batch_config)
            .build();
        let provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_span_processor(processor)
            .build();
        let tracer = provider.tracer("stubweave");
        opentelemetry::global::set_tracer_provider(provider.clone());
        Ok(Self { tracer, provider })
    }
}

/// The OTLP/HTTP traces URL for a collector base URL or any signal URL of it.
fn trace_endpoint(endpoint: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(endpoint).context("parse OTLP endpoint")?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("OTLP endpoint must use http or https: {endpoint}");
    }
    let path = url.path().trim_end_matches('/').to_string();
    let base = SIGNAL_PATHS
        .iter()
        .find_map(|signal| path.strip_suffix(signal))
        .unwrap_or(path.as_str());
    url.set_path(&format!("{base}{TRACES_PATH}"));
    Ok(url.to_string())
}

/// Install the stderr subscriber. Overlay diagnostics surface through it as `warn!`.
pub(crate) fn init_logging() {
    let init_result = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stubweave=info,warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    let _ = init_result;
}

/// Trace ID of the active span, recorded in the SARIF invocation.
pub(crate) fn current_trace_id() -> Option<String> {
    let cx = OtelContext::current();
    let span = cx.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

/// Note on the active span what one overlay file contributed.
pub(crate) fn record_overlay_outcome(elements: usize, diagnostics: usize) {
    let cx = OtelContext::current();
    let span = cx.span();
    if !span.span_context().is_valid() {
        return;
    }
    span.add_event(
        "overlay.merged",
        vec![
            KeyValue::new("stubweave.elements", elements as i64),
            KeyValue::new("stubweave.diagnostics", diagnostics as i64),
        ],
    );
}

/// Run `f` inside a span for `phase` when telemetry is enabled.
pub(crate) fn with_span<T, F>(
    telemetry: Option<&Telemetry>,
    phase: Phase,
    attributes: &[KeyValue],
    f: F,
) -> T
where
    F: FnOnce() -> T,
{
    match telemetry {
        Some(telemetry) => telemetry.in_phase(phase, attributes, f),
        None => f(),
    }
}
