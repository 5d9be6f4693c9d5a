//! Logging and optional OpenTelemetry trace export
//!
//! Console logging is always on. When an OTLP endpoint is configured, spans
//! (`triage_cycle`, `triage_sweep`, ...) are also exported so a cycle's
//! `trace_id` can be followed in a tracing backend.
//!
//! ```text
//! sentinel → fmt layer → stderr
//!          → OTLP (gRPC) → OTel Collector → Tempo
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,sentinel=debug";

/// Logging options
#[derive(Debug, Clone, Default)]
pub struct TracingOptions<'a> {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set
    pub log_filter: Option<&'a str>,
    /// OTLP collector endpoint, e.g. `http://localhost:4317`
    pub otlp_endpoint: Option<&'a str>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `service_name` - Name for the service in exported traces
/// * `options` - Filter, optional OTLP endpoint, output format
///
/// # Example
/// ```ignore
/// init_tracing("sentinel", &TracingOptions::default())?;
/// ```
pub fn init_tracing(
    service_name: &str,
    options: &TracingOptions<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = build_filter(options.log_filter);

    let otel_layer = match options.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let (fmt_text, fmt_json) = if options.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_text)
        .with(fmt_json)
        .with(otel_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        otlp_endpoint = options.otlp_endpoint.unwrap_or("disabled"),
        "Tracing initialized"
    );

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

fn build_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
