//! SHA-256 registry checksums.
//!
//! Implements the `ContentHasher` trait from `fns-core` using the `sha2`
//! crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use fns_core::service::hash::ContentHasher;

/// SHA-256 implementation of `ContentHasher`.
///
/// Produces lowercase hex digests. The registry feeds it the sorted
/// `name:version` list of its definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256ContentHasher;

impl Sha256ContentHasher {
    pub fn new() -> Self {
        Self
    }
}

impl ContentHasher for Sha256ContentHasher {
    fn compute_hash(&self, content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        format!("{:x}", digest)
    }
}
