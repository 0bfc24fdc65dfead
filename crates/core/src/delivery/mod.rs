//! Result delivery to the requesting system.
//!
//! When a batch finishes, [`DeliveryNotifier`] POSTs a signed
//! [`WebhookPayload`] to the batch's callback URL. Failed sends are retried on
//! a fixed ladder; once the ladder is exhausted the notification is persisted
//! as a [`DeliveryFailureRecord`] for manual redrive.

mod error;
mod notifier;
mod signature;
mod sqlite;
mod store;
mod transport;
mod types;

pub use error::{DeliveryError, DeliveryStoreError, TransportError};
pub use notifier::{DeliveryNotifier, DeliveryOutcome, DeliverySettings};
pub use signature::{format_signature_header, verify_webhook, SIGNATURE_HEADER};
pub use sqlite::SqliteDeliveryFailureStore;
pub use store::DeliveryFailureStore;
pub use transport::{HttpWebhookTransport, WebhookRequest, WebhookTransport};
pub use types::{DeliveryFailureRecord, WebhookPayload};
