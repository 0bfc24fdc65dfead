use chrono::{DateTime, Utc};

use super::error::DeliveryStoreError;
use super::types::DeliveryFailureRecord;

/// Durable storage for undeliverable notifications.
pub trait DeliveryFailureStore: Send + Sync {
    fn record(&self, record: &DeliveryFailureRecord) -> Result<(), DeliveryStoreError>;

    fn get(&self, id: &str) -> Result<Option<DeliveryFailureRecord>, DeliveryStoreError>;

    /// Unresolved records, oldest first.
    fn list_unresolved(&self) -> Result<Vec<DeliveryFailureRecord>, DeliveryStoreError>;

    fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<(), DeliveryStoreError>;

    /// Record another failed redelivery.
    fn record_attempt(
        &self,
        id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), DeliveryStoreError>;
}
