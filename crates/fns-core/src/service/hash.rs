//! ContentHasher trait for computing registry checksums.
//!
//! Defined in fns-core so the registry can fingerprint its definitions without
//! coupling to a specific hashing algorithm. The `Sha256ContentHasher` adapter
//! lives in fns-infra.

/// Abstraction over content hashing.
///
/// Used by the `Registry` to derive the checksum the orchestrator compares
/// against to detect redeployed function sets.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}
