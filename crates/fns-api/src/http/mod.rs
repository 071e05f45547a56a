//! HTTP adapter for the orchestrator.
//!
//! `GET /` serves the function config, `POST /` runs one invocation,
//! `GET /health` reports liveness.

pub mod error;
pub mod handlers;
pub mod router;
