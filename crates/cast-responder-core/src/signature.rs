//! Webhook signature verification.
//!
//! Verifies the `x-neynar-signature` header, a lowercase hex HMAC-SHA256 digest of
//! the raw request body keyed by the shared webhook secret.
//!
//! # Security
//!
//! - The digest is always computed over the bytes exactly as received; callers
//!   must never re-serialize a parsed payload before verification
//! - The comparison is constant-time over the full digest length, including for
//!   malformed or wrongly sized signatures
//! - Secrets and computed digests are never logged

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use tracing::debug;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Name of the HTTP header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-neynar-signature";

/// Length in bytes of an HMAC-SHA256 digest.
const DIGEST_LEN: usize = 32;

/// Optional prefix some senders put in front of the hex digest.
const SHA256_PREFIX: &str = "sha256=";

/// Compute the hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
///
/// # Examples
///
/// ```rust
/// use cast_responder_core::signature::{compute_signature, verify};
///
/// let signature = compute_signature(b"secret", b"{\"type\":\"cast.created\"}");
/// assert!(verify(b"secret", b"{\"type\":\"cast.created\"}", &signature));
/// ```
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    hex::encode(compute_digest(secret, payload))
}

/// Verify a provided hex signature against the raw body.
///
/// Returns `false`, never an error, when the signature or the secret is
/// missing, when the signature is not valid hex, or when its decoded length
/// differs from the digest length. All of those paths still compute the HMAC
/// and run a full-length constant-time comparison so they take the same time
/// as a genuine mismatch.
pub fn verify(secret: &[u8], raw_body: &[u8], provided_signature_hex: &str) -> bool {
    let expected = compute_digest(secret, raw_body);

    let (candidate, well_formed) = match decode_signature(provided_signature_hex) {
        Some(bytes) => (bytes, Choice::from(1)),
        None => ([0u8; DIGEST_LEN], Choice::from(0)),
    };

    let secret_present = Choice::from(u8::from(!secret.is_empty()));
    let digest_matches = expected.as_slice().ct_eq(candidate.as_slice());

    (digest_matches & well_formed & secret_present).into()
}

fn compute_digest(secret: &[u8], payload: &[u8]) -> [u8; DIGEST_LEN] {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return [0u8; DIGEST_LEN],
    };
    mac.update(payload);
    mac.finalize().into_bytes().into()
}

/// Decode a hex signature into a digest-sized buffer.
fn decode_signature(signature: &str) -> Option<[u8; DIGEST_LEN]> {
    let trimmed = signature.trim();
    let hex_part = trimmed.strip_prefix(SHA256_PREFIX).unwrap_or(trimmed);

    let bytes = hex::decode(hex_part).ok()?;
    bytes.try_into().ok()
}

// ============================================================================
// SignatureVerifier
// ============================================================================

/// Verifies webhook signatures with a secret fixed at construction time.
///
/// The secret is zeroed on drop and redacted from `Debug` output.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Zeroizing<Vec<u8>>,
}

impl SignatureVerifier {
    /// Create a verifier for the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into().into_bytes()),
        }
    }

    /// Verify the signature header value (if any) against the raw body.
    pub fn verify(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        let Some(signature) = signature else {
            debug!("Signature header missing");
            return false;
        };

        let valid = verify(&self.secret, raw_body, signature);
        if !valid {
            debug!(
                sig_len = signature.len(),
                body_len = raw_body.len(),
                "Signature did not match"
            );
        }
        valid
    }
}

// Security: Don't expose secrets in debug output
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
