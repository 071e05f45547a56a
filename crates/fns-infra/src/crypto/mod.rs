//! Cryptographic operations for fns.
//!
//! - `hash`: SHA-256 registry checksums
//! - `signature`: HMAC-SHA256 event signing and verification

pub mod hash;
pub mod signature;
