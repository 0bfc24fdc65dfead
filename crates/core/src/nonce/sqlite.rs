//! SQLite-backed nonce store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{NonceStore, NonceStoreError};

/// SQLite-backed nonce store.
///
/// `set_if_absent` is a single UPSERT statement that only overwrites rows
/// whose TTL has elapsed, so concurrent validators cannot both win.
pub struct SqliteNonceStore {
    conn: Mutex<Connection>,
}

impl SqliteNonceStore {
    /// Open (or create) the store in the given database file.
    pub fn new(path: &Path) -> Result<Self, NonceStoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, NonceStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), NonceStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nonces (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nonces_expires_at ON nonces(expires_at);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delete expired rows. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, NonceStoreError> {
        let now = Utc::now().timestamp_millis();
        self.conn()
            .execute("DELETE FROM nonces WHERE expires_at <= ?", params![now])
            .map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> NonceStoreError {
    NonceStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl NonceStore for SqliteNonceStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(ttl.as_millis() as i64);

        let changed = self
            .conn()
            .execute(
                r#"
                INSERT INTO nonces (key, value, expires_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE
                    SET value = excluded.value, expires_at = excluded.expires_at
                    WHERE nonces.expires_at <= ?4
                "#,
                params![key, value, expires_at, now],
            )
            .map_err(db_err)?;

        Ok(changed == 1)
    }

    async fn exists(&self, key: &str) -> Result<bool, NonceStoreError> {
        let now = Utc::now().timestamp_millis();
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM nonces WHERE key = ? AND expires_at > ?",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, NonceStoreError> {
        let now = Utc::now().timestamp_millis();
        self.conn()
            .query_row(
                "SELECT value FROM nonces WHERE key = ? AND expires_at > ?",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }
}
