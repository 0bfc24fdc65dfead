//! Single-use nonce storage for replay protection.
//!
//! The store is the only state shared by concurrent validators, so
//! "set-if-absent" must be atomic inside the store rather than a client-side
//! check-then-set.

mod memory;
mod sqlite;
mod store;

pub use memory::InMemoryNonceStore;
pub use sqlite::SqliteNonceStore;
pub use store::{nonce_key, NonceStore, NonceStoreError, NONCE_KEY_PREFIX};
