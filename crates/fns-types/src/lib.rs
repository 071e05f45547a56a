//! Shared wire and domain types for fns.
//!
//! This crate contains everything that crosses the boundary between the
//! engine and its caller: step history records, mutations, the inbound
//! event and outbound response envelopes, function metadata exports, and
//! configuration.
//!
//! Zero engine logic -- only serde, chrono, thiserror, secrecy.

pub mod config;
pub mod definition;
pub mod error;
pub mod event;
pub mod step;
