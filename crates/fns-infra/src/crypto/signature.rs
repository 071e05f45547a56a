//! HMAC-SHA256 event signatures.
//!
//! The orchestrator signs every event body it delivers. The header value is
//! `"<unix-ms>,<base64 digest>"` where the digest is
//! `HMAC-SHA256(secret, body || unix-ms)`. A signature older (or newer) than
//! the tolerance window is rejected, which bounds replay of captured requests.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use fns_core::clock::{Clock, SystemClock};
use fns_core::service::signature::SignatureVerifier;
use fns_types::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the request header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-fns-signature";

/// Default accepted clock skew between signer and verifier.
pub const DEFAULT_TOLERANCE_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

fn digest(secret: &SecretString, body: &str, timestamp_ms: i64) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(body.as_bytes());
    mac.update(timestamp_ms.to_string().as_bytes());
    Ok(mac)
}

/// Produce the header value for `body` signed at `timestamp_ms`.
pub fn sign(body: &str, secret: &SecretString, timestamp_ms: i64) -> Result<String, SignatureError> {
    let tag = digest(secret, body, timestamp_ms)?.finalize().into_bytes();
    Ok(format!("{timestamp_ms},{}", STANDARD.encode(tag)))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// `SignatureVerifier` for the `x-fns-signature` scheme.
pub struct HmacSignatureVerifier {
    tolerance_ms: u64,
    clock: Arc<dyn Clock>,
}

impl HmacSignatureVerifier {
    pub fn new(tolerance_ms: u64) -> Self {
        Self {
            tolerance_ms,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for HmacSignatureVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_MS)
    }
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, payload: &str, secret: &SecretString, signature: &str) -> Result<bool, SignatureError> {
        if signature.is_empty() {
            return Err(SignatureError::MissingHeader);
        }
        let (timestamp, encoded) = signature
            .split_once(',')
            .ok_or_else(|| SignatureError::MalformedHeader("expected \"<timestamp>,<digest>\"".into()))?;
        let timestamp_ms: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::MalformedHeader(format!("invalid timestamp '{timestamp}'")))?;
        let tag = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SignatureError::MalformedHeader(format!("invalid digest: {e}")))?;

        let now_ms = self.clock.now().timestamp_millis();
        let skew = now_ms.abs_diff(timestamp_ms);
        if skew > self.tolerance_ms {
            tracing::debug!(skew_ms = skew, tolerance_ms = self.tolerance_ms, "signature timestamp outside tolerance");
            return Ok(false);
        }

        // verify_slice compares in constant time
        Ok(digest(secret, payload, timestamp_ms)?.verify_slice(&tag).is_ok())
    }
}
