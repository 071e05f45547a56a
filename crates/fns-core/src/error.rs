//! Error types for the replay engine.

use fns_types::error::StepRecordError;
use thiserror::Error;

/// A broken engine invariant: replay divergence, hook misuse, or bad step
/// arguments. Always classified non-retryable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step id is required")]
    MissingId,

    #[error("invalid step id {found} expected {expected} at position {position}")]
    ReplayDivergence {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("invalid step record at position {position}: {source}")]
    MalformedHistory {
        position: usize,
        #[source]
        source: StepRecordError,
    },

    #[error("step {inner} started inside the perform of step {outer}")]
    NestedStep { inner: String, outer: String },

    #[error("Signal {0} not found")]
    SignalNotFound(String),

    #[error("Signal {0} already in use")]
    DuplicateSignal(String),

    #[error("Query {0} already in use")]
    DuplicateQuery(String),

    #[error("invalid duration: '{0}'")]
    InvalidDuration(String),

    #[error("lock keys must not be empty")]
    EmptyLockKeys,

    #[error("failed to (de)serialize {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub(crate) fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised while building a function definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("function name is required")]
    MissingName,

    #[error("Failed to create function {name}:{version} with message: {message}")]
    Setup {
        name: String,
        version: u32,
        message: String,
    },
}

/// Errors from turning a raw request body into a trusted [`Event`](fns_types::event::Event).
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("signing key is required outside dev mode")]
    SigningKeyRequired,

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Failures that prevent an invocation from producing an envelope at all.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Aborted")]
    Aborted,

    #[error("Function {0} not found")]
    FunctionNotFound(String),
}
