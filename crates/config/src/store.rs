//! Store configuration
//!
//! Connection settings for the ClickHouse HTTP interface.

use serde::Deserialize;
use std::time::Duration;

/// ClickHouse store configuration
///
/// # Example
///
/// ```toml
/// [store]
/// url = "http://localhost:8123"
/// database = "analytics"
/// username = "default"
/// timeout = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// ClickHouse HTTP URL
    /// Default: "http://localhost:8123"
    pub url: String,

    /// Database name
    /// Default: "default"
    pub database: String,

    /// Username for authentication (optional)
    pub username: Option<String>,

    /// Password for authentication (optional)
    pub password: Option<String>,

    /// Request timeout
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// In-place retries for transient insert failures
    /// Default: 2
    pub retry_attempts: u32,

    /// Base delay for exponential backoff between retries
    /// Default: 500ms
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Maximum retry delay
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            database: "default".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.url, "http://localhost:8123");
        assert_eq!(config.database, "default");
        assert!(config.username.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 2);
    }

    #[test]
    fn test_deserialize_credentials() {
        let config: StoreConfig = toml::from_str(
            r#"
username = "writer"
password = "secret"
retry_base_delay = "250ms"
"#,
        )
        .unwrap();
        assert_eq!(config.username.as_deref(), Some("writer"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
    }
}
