//! Flush policy configuration
//!
//! Thresholds that decide when staged rows are bulk-loaded, and the periods
//! of the two sweep timers.

use serde::Deserialize;
use std::time::Duration;

/// Flush policy configuration
///
/// # Example
///
/// ```toml
/// [flush]
/// latency_threshold = "20s"
/// size_threshold = 5242880
/// sweep_interval = "20s"
/// recovery_interval = "1h"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Flush once the oldest unflushed row is this old
    /// Default: 20s
    #[serde(with = "humantime_serde")]
    pub latency_threshold: Duration,

    /// Flush once the staging file reaches this many bytes
    /// Default: 5 MiB
    pub size_threshold: u64,

    /// Period of the normal (eligibility-gated) sweep
    /// Default: 20s
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Period of the forced recovery sweep
    /// Default: 1h
    #[serde(with = "humantime_serde")]
    pub recovery_interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            latency_threshold: Duration::from_secs(20),
            size_threshold: 5 * 1024 * 1024,
            sweep_interval: Duration::from_secs(20),
            recovery_interval: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FlushConfig::default();
        assert_eq!(config.latency_threshold, Duration::from_secs(20));
        assert_eq!(config.size_threshold, 5_242_880);
        assert_eq!(config.sweep_interval, Duration::from_secs(20));
        assert_eq!(config.recovery_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: FlushConfig = toml::from_str(
            r#"
latency_threshold = "500ms"
recovery_interval = "2h"
"#,
        )
        .unwrap();
        assert_eq!(config.latency_threshold, Duration::from_millis(500));
        assert_eq!(config.recovery_interval, Duration::from_secs(7200));
        assert_eq!(config.size_threshold, 5_242_880);
    }
}
