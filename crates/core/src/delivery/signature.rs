//! Webhook signature header.
//!
//! The `X-Ticketgen-Signature` header carries `sha256=<hex>`: HMAC-SHA256 of
//! the exact request body under the shared webhook secret.

use crate::signing::SigningKey;

pub const SIGNATURE_HEADER: &str = "X-Ticketgen-Signature";

pub fn format_signature_header(key: &SigningKey, body: &[u8]) -> String {
    format!("sha256={}", key.sign_bytes(body))
}

/// Verify a received webhook. Malformed headers fail verification.
///
/// The comparison is constant-time.
pub fn verify_webhook(body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(hex_sig) = signature_header.trim().strip_prefix("sha256=") else {
        return false;
    };
    SigningKey::new(secret).verify_bytes(body, hex_sig)
}
