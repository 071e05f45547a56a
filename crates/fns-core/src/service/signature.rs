//! SignatureVerifier trait for authenticating inbound events.
//!
//! The HMAC-SHA256 scheme lives in fns-infra; the engine only needs a yes/no
//! verdict (or a reason the header could not be checked at all).

use fns_types::error::SignatureError;
use secrecy::SecretString;

/// Checks that a raw request body was signed with the shared secret.
pub trait SignatureVerifier: Send + Sync {
    /// `Ok(false)` means the header was well-formed but the digest did not
    /// match or the timestamp fell outside the tolerance window.
    fn verify(
        &self,
        payload: &str,
        secret: &SecretString,
        signature: &str,
    ) -> Result<bool, SignatureError>;
}
