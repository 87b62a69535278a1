//! IPN webhook signature verification.
//!
//! The gateway signs every callback with HMAC-SHA512 over the exact raw
//! request body and sends the hex digest in a header. Verification must run
//! on the raw bytes - re-serializing the JSON can change the byte layout and
//! invalidate the signature.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Verifier for gateway IPN signatures.
pub struct IpnVerifier {
    /// Shared IPN secret from the gateway dashboard.
    secret: SecretString,
}

impl IpnVerifier {
    /// Creates a verifier with the given IPN secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
        }
    }

    /// Verifies a hex-encoded HMAC-SHA512 signature over the raw body.
    ///
    /// Returns false - never errors - on an empty secret, a malformed header
    /// or a mismatch. Comparison is constant-time.
    pub fn verify(&self, raw_body: &[u8], signature_header: &str) -> bool {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return false;
        }

        let provided = match hex::decode(signature_header.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(raw_body);
        let expected = mac.finalize().into_bytes();

        constant_time_compare(expected.as_slice(), &provided)
    }
}

/// Constant-time comparison of two byte slices.
///
/// Prevents timing attacks that could leak the expected signature.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes a hex signature the way the gateway does.
///
/// Used to build fixtures and to exercise the webhook locally.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
