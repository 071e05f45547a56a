use thiserror::Error;

use crate::step::StepType;

/// Errors raised while validating a step record or mutation from the wire.
#[derive(Debug, Error)]
pub enum StepRecordError {
    #[error("step record id is required")]
    MissingId,

    #[error("malformed step record: {0}")]
    Malformed(String),

    #[error("invalid params for {step_type} step: {reason}")]
    InvalidParams { step_type: StepType, reason: String },
}

/// Errors from signature verification (used by the `SignatureVerifier` port in fns-core).
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header is empty")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// A failure that retrying cannot fix.
///
/// Return this (directly or wrapped with `anyhow` context) from a function
/// body or a step to mark the execution as failed without retry.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NonRetriableError {
    pub message: String,
}

impl NonRetriableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
