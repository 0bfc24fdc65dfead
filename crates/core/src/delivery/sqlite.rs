//! SQLite-backed delivery failure store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::error::DeliveryStoreError;
use super::store::DeliveryFailureStore;
use super::types::DeliveryFailureRecord;

pub struct SqliteDeliveryFailureStore {
    conn: Mutex<Connection>,
}

impl SqliteDeliveryFailureStore {
    pub fn new(path: &Path) -> Result<Self, DeliveryStoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, DeliveryStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), DeliveryStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_failures (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                target_url TEXT NOT NULL,
                payload TEXT NOT NULL,
                last_error TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_delivery_failures_batch_id ON delivery_failures(batch_id);
            CREATE INDEX IF NOT EXISTS idx_delivery_failures_resolved_at ON delivery_failures(resolved_at);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DeliveryFailureRecord> {
        let created_at: String = row.get(6)?;
        let resolved_at: Option<String> = row.get(7)?;

        Ok(DeliveryFailureRecord {
            id: row.get(0)?,
            batch_id: row.get(1)?,
            target_url: row.get(2)?,
            payload: row.get(3)?,
            last_error: row.get(4)?,
            attempts: row.get(5)?,
            created_at: parse_time(&created_at).unwrap_or_else(Utc::now),
            resolved_at: resolved_at.as_deref().and_then(parse_time),
        })
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn db_err(e: rusqlite::Error) -> DeliveryStoreError {
    DeliveryStoreError::Database(e.to_string())
}

const SELECT_COLUMNS: &str =
    "SELECT id, batch_id, target_url, payload, last_error, attempts, created_at, resolved_at FROM delivery_failures";

impl DeliveryFailureStore for SqliteDeliveryFailureStore {
    fn record(&self, record: &DeliveryFailureRecord) -> Result<(), DeliveryStoreError> {
        self.conn()
            .execute(
                r#"
                INSERT INTO delivery_failures
                    (id, batch_id, target_url, payload, last_error, attempts, created_at, resolved_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.id,
                    record.batch_id,
                    record.target_url,
                    record.payload,
                    record.last_error,
                    record.attempts,
                    record.created_at.to_rfc3339(),
                    record.resolved_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<DeliveryFailureRecord>, DeliveryStoreError> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?"),
                params![id],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)
    }

    fn list_unresolved(&self) -> Result<Vec<DeliveryFailureRecord>, DeliveryStoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE resolved_at IS NULL ORDER BY created_at ASC"
            ))
            .map_err(db_err)?;
        let records = stmt
            .query_map([], Self::row_to_record)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(records)
    }

    fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<(), DeliveryStoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE delivery_failures SET resolved_at = ? WHERE id = ?",
                params![at.to_rfc3339(), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DeliveryStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_attempt(
        &self,
        id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), DeliveryStoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE delivery_failures SET last_error = ?, attempts = ? WHERE id = ?",
                params![error, attempts, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DeliveryStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
