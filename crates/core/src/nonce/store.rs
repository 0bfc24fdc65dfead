use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Key prefix for consumed token nonces.
pub const NONCE_KEY_PREFIX: &str = "qr_nonce:";

/// Build the store key for a token nonce.
pub fn nonce_key(nonce: &str) -> String {
    format!("{}{}", NONCE_KEY_PREFIX, nonce)
}

#[derive(Debug, Error)]
pub enum NonceStoreError {
    /// The backing store could not be reached or returned an error.
    #[error("nonce store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with per-key TTL.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &'static str;

    /// Atomically store `value` under `key` unless a live entry exists.
    ///
    /// Returns `true` if the value was stored, `false` if the key was
    /// already present.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError>;

    /// Whether a live (unexpired) entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool, NonceStoreError>;

    /// Value stored under `key`, if live.
    async fn get(&self, key: &str) -> Result<Option<String>, NonceStoreError>;
}
