use thiserror::Error;

/// Errors produced while signing or validating ticket tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Ticket identity fields missing at signing time.
    #[error("invalid ticket data: {0}")]
    InvalidTicketData(String),

    /// The scanned payload is not a JSON object.
    #[error("QR code payload is malformed: {0}")]
    QrCodeFormat(String),

    /// Required token fields are missing or have the wrong type.
    #[error("QR code payload is invalid: {0}")]
    InvalidQrData(String),

    /// Signature does not match the token contents.
    #[error("QR code signature mismatch")]
    QrCodeTampered,

    /// Token is older than the validity window.
    #[error("ticket expired: signed {age_secs}s ago, window is {ttl_secs}s")]
    TicketExpired { age_secs: i64, ttl_secs: i64 },

    /// Nonce was already consumed by an earlier validation.
    #[error("QR code already used for ticket {ticket_id}")]
    ReplayDetected { ticket_id: String },

    /// The nonce store failed and the policy is fail-closed.
    #[error("nonce store unavailable: {0}")]
    NonceStoreUnavailable(String),

    /// Token could not be serialized for signing.
    #[error("failed to encode token: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl TokenError {
    /// Signature mismatches and replays are security events, not plain
    /// validation failures.
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::QrCodeTampered | Self::ReplayDetected { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTicketData(_) => "INVALID_TICKET_DATA",
            Self::QrCodeFormat(_) => "QR_CODE_FORMAT_ERROR",
            Self::InvalidQrData(_) => "INVALID_QR_DATA",
            Self::QrCodeTampered => "QR_CODE_TAMPERED",
            Self::TicketExpired { .. } => "TICKET_EXPIRED",
            Self::ReplayDetected { .. } => "QR_CODE_REPLAYED",
            Self::NonceStoreUnavailable(_) => "NONCE_STORE_UNAVAILABLE",
            Self::Encoding(_) => "TOKEN_ENCODING_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_classification() {
        assert!(TokenError::QrCodeTampered.is_security_event());
        assert!(TokenError::ReplayDetected {
            ticket_id: "t1".to_string()
        }
        .is_security_event());
        assert!(!TokenError::TicketExpired {
            age_secs: 90000,
            ttl_secs: 86400
        }
        .is_security_event());
        assert!(!TokenError::InvalidQrData("nonce".to_string()).is_security_event());
    }

    #[test]
    fn test_error_display() {
        let err = TokenError::ReplayDetected {
            ticket_id: "t-42".to_string(),
        };
        assert_eq!(err.to_string(), "QR code already used for ticket t-42");
        assert_eq!(err.code(), "QR_CODE_REPLAYED");
    }
}
