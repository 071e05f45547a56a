//! Replay engine and function registry for fns.
//!
//! This crate re-runs user-authored step functions against a caller-supplied
//! history, short-circuits completed steps, and reports the mutations the
//! caller must persist to make progress. It owns no storage and schedules
//! nothing; ports (`ContentHasher`, `SignatureVerifier`, `Clock`) are
//! implemented in `fns-infra` or by the host.

pub mod clock;
pub mod definition;
pub mod duration;
pub mod engine;
pub mod error;
pub mod registry;
pub mod service;

pub use definition::{Body, FunctionDefinition, body};
pub use engine::{Engine, EngineConfig, Execution};
pub use error::{DefinitionError, EngineError, HandlerError, SecurityError};
pub use registry::Registry;
