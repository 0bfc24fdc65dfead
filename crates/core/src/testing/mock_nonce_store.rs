//! Nonce store that is always down.

use std::time::Duration;

use async_trait::async_trait;

use crate::nonce::{NonceStore, NonceStoreError};

/// Every call fails with [`NonceStoreError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableNonceStore;

#[async_trait]
impl NonceStore for UnavailableNonceStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, NonceStoreError> {
        Err(NonceStoreError::Unavailable("connection refused".to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, NonceStoreError> {
        Err(NonceStoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, NonceStoreError> {
        Err(NonceStoreError::Unavailable("connection refused".to_string()))
    }
}
