//! Signed ticket tokens (the payload encoded into a ticket's QR code).
//!
//! - [`TokenSigner`] creates tokens: HMAC-SHA256 over the canonical JSON of
//!   every field except the signature, with a fresh 128-bit nonce.
//! - [`TokenValidator`] checks format, required fields, signature, expiry and
//!   replay, in that order, and marks the nonce as consumed.

mod error;
mod signer;
mod types;
mod validator;

pub use error::TokenError;
pub use signer::TokenSigner;
pub use types::{SignedTicketToken, TicketData, ValidatedTicket, DEFAULT_TICKET_TYPE};
pub use validator::{ReplayStoreFailurePolicy, TokenValidator, ValidatorSettings};
