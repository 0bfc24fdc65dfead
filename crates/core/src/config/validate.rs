use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Signing secret is set and nonces outlive tokens
/// - Queue, worker and batch limits are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    // Server validation
    if config.server.port == 0 {
        return fail("server.port cannot be 0");
    }

    // Signing validation
    if config.signing.secret.trim().is_empty() {
        return fail("signing.secret cannot be empty");
    }
    if config.signing.token_ttl_secs == 0 {
        return fail("signing.token_ttl_secs cannot be 0");
    }
    if config.signing.nonce_ttl_secs < config.signing.token_ttl_secs {
        return fail("signing.nonce_ttl_secs must be at least signing.token_ttl_secs");
    }

    // Queue validation
    let queues = &config.queues;
    if queues.default_attempts == 0 {
        return fail("queues.default_attempts cannot be 0");
    }
    if queues.backoff_multiplier < 1.0 {
        return fail("queues.backoff_multiplier must be at least 1.0");
    }
    if queues.lease_duration_ms == 0 {
        return fail("queues.lease_duration_ms cannot be 0");
    }
    let concurrency = &queues.concurrency;
    for (name, value) in [
        ("ticket_generation", concurrency.ticket_generation),
        ("document_generation", concurrency.document_generation),
        ("composite_batch", concurrency.composite_batch),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "queues.concurrency.{} cannot be 0",
                name
            )));
        }
    }

    // Dispatcher validation
    if config.dispatcher.max_batch_size == 0 {
        return fail("dispatcher.max_batch_size cannot be 0");
    }
    if config.dispatcher.max_tickets_per_job == 0 {
        return fail("dispatcher.max_tickets_per_job cannot be 0");
    }

    // Delivery validation
    if let Some(url) = &config.delivery.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return fail("delivery.webhook_url must be an http(s) URL");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid() -> Config {
        load_config_from_str("[signing]\nsecret = \"abc\"").unwrap()
    }

    fn assert_invalid(config: &Config, needle: &str) {
        let err = validate_config(config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid();
        config.server.port = 0;
        assert_invalid(&config, "server.port");
    }

    #[test]
    fn test_validate_empty_secret_fails() {
        let mut config = valid();
        config.signing.secret = "  ".to_string();
        assert_invalid(&config, "signing.secret");
    }

    #[test]
    fn test_validate_nonce_ttl_shorter_than_token_ttl_fails() {
        let mut config = valid();
        config.signing.nonce_ttl_secs = 3600;
        assert_invalid(&config, "nonce_ttl_secs");
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = valid();
        config.queues.concurrency.document_generation = 0;
        assert_invalid(&config, "document_generation");
    }

    #[test]
    fn test_validate_zero_limits_fail() {
        let mut config = valid();
        config.dispatcher.max_batch_size = 0;
        assert_invalid(&config, "max_batch_size");

        let mut config = valid();
        config.dispatcher.max_tickets_per_job = 0;
        assert_invalid(&config, "max_tickets_per_job");

        let mut config = valid();
        config.queues.default_attempts = 0;
        assert_invalid(&config, "default_attempts");
    }

    #[test]
    fn test_validate_webhook_url_scheme() {
        let mut config = valid();
        config.delivery.webhook_url = Some("ftp://example.test".to_string());
        assert_invalid(&config, "webhook_url");
    }
}
