//! The replay engine.
//!
//! # Invocation flow
//!
//! 1. Verify the event (signature, unless in dev mode) and look up the function.
//! 2. Run the setup closure against live hooks seeded from the event state.
//! 3. Deliver signals at the head of the history.
//! 4. Race the body within one tick: it returns, parks on a step, or fails.
//! 5. Evaluate queries and assemble the response envelope.
//!
//! Nothing survives between invocations: history and state come in with the
//! event, mutations and changed state go out with the response.

pub(crate) mod assemble;
pub mod hooks;
pub(crate) mod invocation;
pub mod logger;
pub mod state;
pub mod step;
pub(crate) mod suspend;
pub(crate) mod tick;
pub(crate) mod unwind;

use std::sync::Arc;

use fns_types::config::{FnsConfig, LogLimits};
use fns_types::definition::ExternalConfig;
use fns_types::event::{Event, Response};
use fns_types::step::StepRecord;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use self::assemble::assemble;
use self::hooks::Hooks;
use self::invocation::{Invocation, drain_signals};
use self::logger::Logger;
use self::state::State;
use self::step::Step;
use self::tick::Settled;
use self::unwind::guarded;
use crate::clock::{Clock, SystemClock};
use crate::definition::FunctionDefinition;
use crate::error::{EngineError, HandlerError, SecurityError};
use crate::registry::Registry;
use crate::service::signature::SignatureVerifier;

pub use self::assemble::classify;
pub use self::unwind::Panicked;

// ---------------------------------------------------------------------------
// Execution handles
// ---------------------------------------------------------------------------

/// Identity and input of the execution being invoked.
#[derive(Debug, Clone)]
pub struct Context {
    pub id: String,
    pub run_id: String,
    pub data: Value,
}

impl Context {
    /// Decode the input payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| EngineError::serialization("execution data", e))
    }
}

/// Everything a function body gets to work with.
#[derive(Clone)]
pub struct Execution {
    pub ctx: Context,
    pub step: Step,
    pub state: State,
    pub logger: Logger,
    /// The token passed to `Engine::handle`; checked by the engine only at entry.
    pub abort: CancellationToken,
}

/// How the body settled.
#[derive(Debug)]
pub enum Outcome {
    /// The body returned this value.
    Completed(Value),
    /// The body parked on a step that cannot progress in this invocation.
    Suspended,
    /// The body, setup, or signal delivery failed.
    Errored(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine settings derived from [`FnsConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Skip signature checks and mirror user logs to `tracing`.
    pub dev: bool,
    pub signing_key: Option<SecretString>,
    pub logs: LogLimits,
}

impl From<&FnsConfig> for EngineConfig {
    fn from(config: &FnsConfig) -> Self {
        Self {
            dev: config.dev,
            signing_key: config.signing_key.clone(),
            logs: config.logs,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    registry: Registry,
    clock: Arc<dyn Clock>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: Registry) -> Self {
        Self {
            config,
            registry,
            clock: Arc::new(SystemClock),
            verifier: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The `{checksum, definitions}` document for the orchestrator.
    pub fn config(&self) -> ExternalConfig {
        self.registry.export()
    }

    /// Parse a raw request body into an [`Event`], verifying its signature.
    ///
    /// Dev mode skips verification entirely.
    pub fn construct_event(&self, body: &str, signature: Option<&str>) -> Result<Event, SecurityError> {
        let event: Event =
            serde_json::from_str(body).map_err(|e| SecurityError::MalformedEvent(e.to_string()))?;
        if self.config.dev {
            return Ok(event);
        }

        let key = self
            .config
            .signing_key
            .as_ref()
            .ok_or(SecurityError::SigningKeyRequired)?;
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            SecurityError::SignatureVerification("no signature verifier configured".to_string())
        })?;

        let verified = verifier
            .verify(body, key, signature.unwrap_or_default())
            .map_err(|e| SecurityError::SignatureVerification(e.to_string()))?;
        if !verified {
            tracing::warn!(function = %event.name, execution_id = %event.id, "rejected event with invalid signature");
            return Err(SecurityError::InvalidSignature);
        }
        Ok(event)
    }

    /// Run one invocation of the function named by `event`.
    ///
    /// Only an aborted token or an unknown function prevent an envelope;
    /// every other failure is reported inside the response.
    pub async fn handle(&self, event: Event, abort: &CancellationToken) -> Result<Response, HandlerError> {
        if abort.is_cancelled() {
            return Err(HandlerError::Aborted);
        }
        let definition = self
            .registry
            .get(&event.name)
            .ok_or_else(|| HandlerError::FunctionNotFound(event.name.clone()))?;

        if let Some(version) = event.version
            && version != definition.version()
        {
            tracing::warn!(
                function = %event.name,
                requested = version,
                registered = definition.version(),
                "function version mismatch"
            );
        }

        let response = self.invoke(&definition, event, abort.clone()).await;
        tracing::debug!(
            function = %definition.name(),
            status = ?response.status,
            mutations = response.mutations.len(),
            "invocation finished"
        );
        Ok(response)
    }

    async fn invoke(&self, definition: &FunctionDefinition, event: Event, abort: CancellationToken) -> Response {
        let Event {
            id,
            run_id,
            name,
            data,
            steps,
            state,
            snapshot,
            ..
        } = event;
        tracing::debug!(function = %name, execution_id = %id, run_id = %run_id, history = steps.len(), "invoking function");

        let history = match parse_history(steps) {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(function = %name, execution_id = %id, error = %err, "rejected malformed history");
                return Response::failed(classify(&anyhow::Error::new(err)));
            }
        };
        let shared = Invocation::new(history, state, self.config.logs).into_shared();
        let state = State::new(Arc::clone(&shared));

        let outcome = 'run: {
            let mut hooks = Hooks::live(Arc::clone(&shared), state.clone());
            let body = match guarded(|| (definition.setup())(&mut hooks)) {
                Ok(body) => body,
                Err(err) => break 'run Outcome::Errored(err),
            };
            if let Err(err) = drain_signals(&shared, &state) {
                break 'run Outcome::Errored(err);
            }

            let execution = Execution {
                logger: Logger::new(Arc::clone(&shared), &name, &id, self.config.dev),
                ctx: Context { id, run_id, data },
                step: Step::new(Arc::clone(&shared), state.clone(), Arc::clone(&self.clock)),
                state: state.clone(),
                abort,
            };
            let body = match guarded(|| Ok(body(execution))) {
                Ok(body) => body,
                Err(err) => break 'run Outcome::Errored(err),
            };
            match tick::race(&shared, body).await {
                Settled::Returned(Ok(value)) => Outcome::Completed(value),
                Settled::Returned(Err(err)) => Outcome::Errored(err),
                Settled::Parked => Outcome::Suspended,
            }
        };

        if let Outcome::Errored(err) = &outcome {
            tracing::debug!(function = %name, error = %err, "function failed");
        }
        assemble(outcome, &shared, &state, snapshot)
    }
}

/// Validate raw history entries; the first bad record fails the invocation.
fn parse_history(steps: Vec<Value>) -> Result<Vec<StepRecord>, EngineError> {
    steps
        .into_iter()
        .enumerate()
        .map(|(position, raw)| {
            StepRecord::from_value(raw).map_err(|source| EngineError::MalformedHistory { position, source })
        })
        .collect()
}
