//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use fns_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
//!
//! init_tracing(TracingOptions { otel: false, json: true }).unwrap();
//! // ... serve ...
//! shutdown_tracing();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,fns=debug";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Subscriber knobs exposed on the `fns` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOptions {
    /// Bridge spans to OpenTelemetry (stdout exporter).
    pub otel: bool,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; otherwise logs at `info`, and user function logs
/// (target `fns::user`, dev mode only) at `debug`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(options: TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let otel_layer = options.otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("fns");
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    let registry = tracing_subscriber::registry().with(env_filter()).with(otel_layer);

    if options.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Flush pending spans and shut down the tracer provider.
///
/// No-op when OpenTelemetry was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        eprintln!("Warning: OTel tracer provider shutdown error: {e}");
    }
}
