//! Configuration validation
//!
//! Catches values that would only fail later at runtime:
//! - Empty connection URLs and names
//! - Zero prefetch, thresholds or timer periods
//! - Destination header names that can't appear in a message

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_broker(config)?;
    validate_store(config)?;
    validate_flush(config)?;
    Ok(())
}

fn validate_broker(config: &Config) -> Result<()> {
    let broker = &config.broker;

    if broker.url.trim().is_empty() {
        return Err(ConfigError::missing_field("broker", "url"));
    }
    if broker.queue.trim().is_empty() {
        return Err(ConfigError::missing_field("broker", "queue"));
    }
    if broker.prefetch == 0 {
        return Err(ConfigError::invalid_value(
            "broker",
            "prefetch",
            "must be greater than 0",
        ));
    }
    if broker.destination_header.trim().is_empty() {
        return Err(ConfigError::missing_field("broker", "destination_header"));
    }

    Ok(())
}

fn validate_store(config: &Config) -> Result<()> {
    let store = &config.store;

    if store.url.trim().is_empty() {
        return Err(ConfigError::missing_field("store", "url"));
    }
    if !store.url.starts_with("http://") && !store.url.starts_with("https://") {
        return Err(ConfigError::invalid_value(
            "store",
            "url",
            format!("'{}' is not an http(s) URL", store.url),
        ));
    }
    if store.database.trim().is_empty() {
        return Err(ConfigError::missing_field("store", "database"));
    }
    if store.retry_max_delay < store.retry_base_delay {
        return Err(ConfigError::invalid_value(
            "store",
            "retry_max_delay",
            "must not be smaller than retry_base_delay",
        ));
    }

    Ok(())
}

fn validate_flush(config: &Config) -> Result<()> {
    let flush = &config.flush;

    if flush.size_threshold == 0 {
        return Err(ConfigError::invalid_value(
            "flush",
            "size_threshold",
            "must be greater than 0",
        ));
    }
    if flush.sweep_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "flush",
            "sweep_interval",
            "must be greater than 0",
        ));
    }
    if flush.recovery_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "flush",
            "recovery_interval",
            "must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_broker_url() {
        let err = Config::from_str("[broker]\nurl = \"\"").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                section: "broker",
                field: "url"
            }
        ));
    }

    #[test]
    fn test_non_http_store_url() {
        let err = Config::from_str("[store]\nurl = \"tcp://clickhouse:9000\"").unwrap_err();
        assert!(err.to_string().contains("not an http(s) URL"));
    }

    #[test]
    fn test_retry_delays_ordered() {
        let toml = r#"
[store]
retry_base_delay = "5s"
retry_max_delay = "1s"
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("retry_max_delay"));
    }

    #[test]
    fn test_zero_size_threshold() {
        let err = Config::from_str("[flush]\nsize_threshold = 0").unwrap_err();
        assert!(err.to_string().contains("size_threshold"));
    }

    #[test]
    fn test_zero_sweep_interval() {
        let err = Config::from_str("[flush]\nsweep_interval = \"0s\"").unwrap_err();
        assert!(err.to_string().contains("sweep_interval"));
    }
}
