//! Application state shared by the CLI and the HTTP handlers.
//!
//! Pins the engine's ports to the concrete infra implementations:
//! SHA-256 registry checksums and HMAC-SHA256 event signatures.

use std::sync::Arc;

use fns_core::{Engine, EngineConfig, Registry};
use fns_infra::crypto::hash::Sha256ContentHasher;
use fns_infra::crypto::signature::HmacSignatureVerifier;
use fns_types::config::FnsConfig;
use tokio_util::sync::CancellationToken;

use crate::functions;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Cancelled on shutdown; invocations started afterwards are refused.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Register the bundled functions and wire the engine.
    pub fn init(config: &FnsConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let mut registry = Registry::new(Arc::new(Sha256ContentHasher::new()));
        registry.register_all(functions::all()?);

        let engine = Engine::new(EngineConfig::from(config), registry)
            .with_verifier(Arc::new(HmacSignatureVerifier::new(config.signature_tolerance_ms)));

        tracing::debug!(
            functions = ?engine.registry().names(),
            checksum = %engine.registry().checksum(),
            "engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            shutdown,
        })
    }
}
