//! Infrastructure layer for fns.
//!
//! Contains implementations of the ports defined in `fns-core`: SHA-256
//! registry checksums, HMAC-SHA256 event signatures, and the TOML config
//! loader.

pub mod config;
pub mod crypto;
