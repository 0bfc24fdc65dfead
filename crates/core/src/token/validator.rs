use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::error::TokenError;
use super::signer::TokenSigner;
use super::types::{SignedTicketToken, ValidatedTicket};
use crate::metrics;
use crate::nonce::{nonce_key, NonceStore, NonceStoreError};

/// Fields that must be present (and non-null) in a scanned token.
const REQUIRED_FIELDS: [&str; 6] = ["id", "eventId", "userId", "signature", "timestamp", "nonce"];

/// What to do when the nonce store cannot be reached during validation.
///
/// `FailOpen` accepts the ticket without replay protection so attendees are
/// not turned away during a storage outage. `FailClosed` rejects it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStoreFailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

/// Validator tuning.
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Maximum token age.
    pub token_ttl: Duration,
    /// Lifetime of a consumed-nonce record. Must be at least `token_ttl`.
    pub nonce_ttl: Duration,
    pub failure_policy: ReplayStoreFailurePolicy,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(24 * 60 * 60),
            nonce_ttl: Duration::from_secs(24 * 60 * 60),
            failure_policy: ReplayStoreFailurePolicy::FailOpen,
        }
    }
}

/// Validates scanned ticket tokens and enforces single use.
pub struct TokenValidator {
    signer: TokenSigner,
    nonce_store: Arc<dyn NonceStore>,
    settings: ValidatorSettings,
}

impl TokenValidator {
    pub fn new(
        signer: TokenSigner,
        nonce_store: Arc<dyn NonceStore>,
        settings: ValidatorSettings,
    ) -> Self {
        Self {
            signer,
            nonce_store,
            settings,
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Validate a raw token and mark its nonce as used.
    pub async fn validate(&self, raw: &str) -> Result<ValidatedTicket, TokenError> {
        self.validate_at(raw, Utc::now()).await
    }

    /// Validate as if the current time were `now`.
    pub async fn validate_at(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedTicket, TokenError> {
        let result = self.run(raw, now).await;
        let label = match &result {
            Ok(_) => "valid",
            Err(e) => result_label(e),
        };
        metrics::TOKEN_VALIDATIONS.with_label_values(&[label]).inc();
        result
    }

    async fn run(&self, raw: &str, now: DateTime<Utc>) -> Result<ValidatedTicket, TokenError> {
        let token = self.inspect(raw, now)?;
        self.consume_nonce(&token).await?;

        debug!(ticket_id = %token.id, event_id = %token.event_id, "Ticket token validated");

        let signed_at = signed_at(&token)?;
        Ok(ValidatedTicket {
            id: token.id,
            event_id: token.event_id,
            user_id: token.user_id,
            ticket_type: token.ticket_type,
            price: token.price,
            created_at: token.created_at,
            signed_at,
            validated_at: now,
        })
    }

    /// Stateless checks: format, required fields, signature and expiry.
    ///
    /// Does not touch the nonce store.
    pub fn inspect(&self, raw: &str, now: DateTime<Utc>) -> Result<SignedTicketToken, TokenError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| TokenError::QrCodeFormat(e.to_string()))?;
        let Value::Object(fields) = &value else {
            return Err(TokenError::QrCodeFormat(
                "token must be a JSON object".to_string(),
            ));
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| fields.get(*name).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(TokenError::InvalidQrData(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let token: SignedTicketToken =
            serde_json::from_value(value).map_err(|e| TokenError::InvalidQrData(e.to_string()))?;

        if !self.signer.verify(&token) {
            warn!(
                target: "security",
                ticket_id = %token.id,
                event_id = %token.event_id,
                "QR code signature mismatch"
            );
            return Err(TokenError::QrCodeTampered);
        }

        let ttl_ms = self.settings.token_ttl.as_millis() as i64;
        let age_ms = now.timestamp_millis() - token.timestamp;
        if age_ms > ttl_ms {
            return Err(TokenError::TicketExpired {
                age_secs: age_ms / 1000,
                ttl_secs: ttl_ms / 1000,
            });
        }

        Ok(token)
    }

    async fn consume_nonce(&self, token: &SignedTicketToken) -> Result<(), TokenError> {
        let key = nonce_key(&token.nonce);

        match self.nonce_store.exists(&key).await {
            Ok(true) => {
                warn!(
                    target: "security",
                    ticket_id = %token.id,
                    nonce = %token.nonce,
                    "Replay detected: nonce already used"
                );
                return Err(TokenError::ReplayDetected {
                    ticket_id: token.id.clone(),
                });
            }
            Ok(false) => {}
            Err(e) => return self.on_store_failure(token, e),
        }

        match self
            .nonce_store
            .set_if_absent(&key, &token.id, self.settings.nonce_ttl)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(
                    target: "security",
                    ticket_id = %token.id,
                    nonce = %token.nonce,
                    "Replay detected: nonce consumed concurrently"
                );
                Err(TokenError::ReplayDetected {
                    ticket_id: token.id.clone(),
                })
            }
            Err(e) => self.on_store_failure(token, e),
        }
    }

    fn on_store_failure(
        &self,
        token: &SignedTicketToken,
        err: NonceStoreError,
    ) -> Result<(), TokenError> {
        match self.settings.failure_policy {
            ReplayStoreFailurePolicy::FailOpen => {
                error!(
                    target: "security",
                    ticket_id = %token.id,
                    store = self.nonce_store.name(),
                    error = %err,
                    "Nonce store unavailable, accepting ticket without replay protection"
                );
                metrics::TOKEN_VALIDATIONS
                    .with_label_values(&["fail_open"])
                    .inc();
                Ok(())
            }
            ReplayStoreFailurePolicy::FailClosed => {
                error!(
                    target: "security",
                    ticket_id = %token.id,
                    store = self.nonce_store.name(),
                    error = %err,
                    "Nonce store unavailable, rejecting ticket"
                );
                Err(TokenError::NonceStoreUnavailable(err.to_string()))
            }
        }
    }
}

fn signed_at(token: &SignedTicketToken) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_millis_opt(token.timestamp)
        .single()
        .ok_or_else(|| TokenError::InvalidQrData("timestamp out of range".to_string()))
}

fn result_label(err: &TokenError) -> &'static str {
    match err {
        TokenError::QrCodeFormat(_) | TokenError::InvalidQrData(_) => "invalid",
        TokenError::QrCodeTampered => "tampered",
        TokenError::TicketExpired { .. } => "expired",
        TokenError::ReplayDetected { .. } => "replayed",
        TokenError::NonceStoreUnavailable(_) => "store_unavailable",
        TokenError::InvalidTicketData(_) | TokenError::Encoding(_) => "error",
    }
}
