use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket type used when the request does not carry one.
pub const DEFAULT_TICKET_TYPE: &str = "standard";

/// Ticket identity as submitted by the requesting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// When the ticket was created upstream. Defaults to signing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Free-form fields passed through to document templates (seat, holder name...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TicketData {
    /// Ticket with only the required identity fields.
    pub fn new(
        id: impl Into<String>,
        event_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_id: event_id.into(),
            user_id: user_id.into(),
            ticket_type: None,
            price: None,
            created_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_type(mut self, ticket_type: impl Into<String>) -> Self {
        self.ticket_type = Some(ticket_type.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Names of required identity fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.event_id.trim().is_empty() {
            missing.push("eventId");
        }
        if self.user_id.trim().is_empty() {
            missing.push("userId");
        }
        missing
    }
}

/// The signed payload encoded into a ticket's QR code.
///
/// Field order is significant: the signature covers the canonical JSON of
/// every field above `signature`, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTicketToken {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    #[serde(rename = "type", default)]
    pub ticket_type: String,
    #[serde(default)]
    pub price: f64,
    /// Ticket creation time, RFC 3339 with millisecond precision.
    #[serde(default)]
    pub created_at: String,
    /// Signing time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// 128-bit random value, hex encoded.
    pub nonce: String,
    /// HMAC-SHA256 hex over the other fields.
    pub signature: String,
}

/// Borrowed view of the signed fields, in signing order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignablePayload<'a> {
    pub id: &'a str,
    pub event_id: &'a str,
    pub user_id: &'a str,
    #[serde(rename = "type")]
    pub ticket_type: &'a str,
    pub price: f64,
    pub created_at: &'a str,
    pub timestamp: i64,
    pub nonce: &'a str,
}

impl SignedTicketToken {
    pub(crate) fn signable(&self) -> SignablePayload<'_> {
        SignablePayload {
            id: &self.id,
            event_id: &self.event_id,
            user_id: &self.user_id,
            ticket_type: &self.ticket_type,
            price: self.price,
            created_at: &self.created_at,
            timestamp: self.timestamp,
            nonce: &self.nonce,
        }
    }

    /// JSON string to encode into the QR image.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Business fields of a successfully validated ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedTicket {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub price: f64,
    pub created_at: String,
    pub signed_at: DateTime<Utc>,
    pub validated_at: DateTime<Utc>,
}
