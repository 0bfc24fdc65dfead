//! Process-local nonce store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::store::{NonceStore, NonceStoreError};

/// Expired entries are swept once the map grows past this size.
const SWEEP_THRESHOLD: usize = 10_000;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory nonce store.
///
/// Only suitable for a single process; replicas must share a real store.
#[derive(Default)]
pub struct InMemoryNonceStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop all expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held (including expired, not yet swept).
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError> {
        let now = Instant::now();
        let mut entries = self.entries();

        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, NonceStoreError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .is_some_and(|entry| entry.expires_at > now))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, NonceStoreError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }
}
