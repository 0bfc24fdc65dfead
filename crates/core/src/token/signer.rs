use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::error::TokenError;
use super::types::{SignedTicketToken, TicketData, DEFAULT_TICKET_TYPE};
use crate::metrics;
use crate::signing::SigningKey;

/// Number of random bytes in a token nonce.
const NONCE_BYTES: usize = 16;

/// Creates signed ticket tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Sign a ticket with the current time as the token timestamp.
    pub fn sign(&self, ticket: &TicketData) -> Result<SignedTicketToken, TokenError> {
        self.sign_at(ticket, Utc::now())
    }

    /// Sign a ticket as if it were `now`.
    pub fn sign_at(
        &self,
        ticket: &TicketData,
        now: DateTime<Utc>,
    ) -> Result<SignedTicketToken, TokenError> {
        let missing = ticket.missing_fields();
        if !missing.is_empty() {
            return Err(TokenError::InvalidTicketData(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let created_at = ticket
            .created_at
            .unwrap_or(now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut token = SignedTicketToken {
            id: ticket.id.clone(),
            event_id: ticket.event_id.clone(),
            user_id: ticket.user_id.clone(),
            ticket_type: ticket
                .ticket_type
                .clone()
                .unwrap_or_else(|| DEFAULT_TICKET_TYPE.to_string()),
            price: ticket.price.unwrap_or(0.0),
            created_at,
            timestamp: now.timestamp_millis(),
            nonce: generate_nonce(),
            signature: String::new(),
        };
        token.signature = self.key.sign_json(&token.signable())?;

        metrics::TOKENS_SIGNED.inc();
        debug!(ticket_id = %token.id, event_id = %token.event_id, "Signed ticket token");
        Ok(token)
    }

    /// Check a token's signature against its other fields.
    pub fn verify(&self, token: &SignedTicketToken) -> bool {
        self.key.verify_json(&token.signable(), &token.signature)
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
