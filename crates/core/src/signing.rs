//! HMAC-SHA256 signing shared by ticket tokens and webhook notifications.
//!
//! Both producers sign the canonical JSON encoding of a payload: the bytes
//! `serde_json` emits for a struct with a fixed field order. Signatures are
//! lowercase hex.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shared signing secret.
///
/// Deliberately not `Debug` so the key cannot end up in logs.
#[derive(Clone)]
pub struct SigningKey {
    secret: Vec<u8>,
}

impl SigningKey {
    /// Create a key from raw secret bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    /// Sign raw bytes, returning the hex encoded MAC.
    pub fn sign_bytes(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign the canonical JSON encoding of `value`.
    pub fn sign_json<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        let bytes = canonical_json(value)?;
        Ok(self.sign_bytes(&bytes))
    }

    /// Verify a hex signature over raw bytes.
    ///
    /// The comparison is constant-time (`Mac::verify_slice`). Malformed hex is
    /// treated as a mismatch.
    pub fn verify_bytes(&self, payload: &[u8], signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    /// Verify a hex signature over the canonical JSON encoding of `value`.
    pub fn verify_json<T: Serialize>(&self, value: &T, signature_hex: &str) -> bool {
        match canonical_json(value) {
            Ok(bytes) => self.verify_bytes(&bytes, signature_hex),
            Err(_) => false,
        }
    }
}

/// Canonical JSON bytes for signing.
///
/// Struct fields serialize in declaration order and `serde_json::Value`
/// objects serialize with sorted keys, so the output is deterministic.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}
