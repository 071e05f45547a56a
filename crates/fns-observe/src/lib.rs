//! Observability setup for fns: structured logs and optional OpenTelemetry spans.

pub mod tracing_setup;
